//! Worker pool (spec §4.5, C6).

pub mod pool;

pub use pool::{Priority, WorkerPool};
