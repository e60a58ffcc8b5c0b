//! Command-line surface (spec §6 host surface): a standalone binary that
//! exercises the core's read operations directly, in lieu of an editor
//! plug-in transport (out of scope per spec §1).

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
