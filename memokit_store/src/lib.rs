//! Storage layer for memokit: an in-memory TTL map, the [`CacheBackend`]
//! capability every store implements, and a SQLite-backed store.

mod backend;
mod errors;
pub mod sqlite;
pub mod ttl_map;

pub use self::backend::CacheBackend;
pub use self::errors::StoreError;
pub use self::sqlite::{SqliteStore, StoredEntry};
pub use self::ttl_map::TtlMap;
