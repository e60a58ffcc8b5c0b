//! Shard codec and store (spec §4.3-§4.4, C4/C5).

pub mod codec;
pub mod store;

pub use store::ShardStore;
