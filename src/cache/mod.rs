//! Two-tier caching for catalog payloads.
//!
//! - A fast in-process map, checked first
//! - A durable key-value tier (SQLite by default) that survives restarts
//! - TTL-based staleness checked lazily at read time
//! - Bounded durable size with eviction, and a clear-and-retry path when
//!   the storage reports it is full

mod layer;
mod storage;
mod traits;

pub use layer::{CachePolicy, CacheStore};
pub use storage::{DurableStore, MemoryStorage, SqliteStorage};
