//! Incremental, workspace-wide symbol index for TypeScript/JavaScript
//! source trees (see `SPEC_FULL.md`): the multi-tier index, the
//! worker-pool parsing pipeline, the sharded persistence layer, the
//! cross-file finalization pass, and the freshness protocol that keeps
//! it all correct under editor edits and version-control checkouts.

pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod finalizer;
pub mod freshness;
pub mod index;
pub mod interner;
pub mod logging;
pub mod merged;
pub mod model;
pub mod open_file;
pub mod protocol;
pub mod shard;
pub mod workers;
