//! Persistent snapshot cache: durable (collection, date-range) → snapshot
//! mapping that survives restarts.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{MemoryStore, SnapshotStore, SqliteStore};
