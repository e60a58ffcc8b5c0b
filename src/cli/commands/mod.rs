//! Command implementations for the CLI. Each subcommand is implemented in
//! its own module and driven directly from `main.rs`.

pub mod index;
pub mod init;
pub mod query;
pub mod serve;
