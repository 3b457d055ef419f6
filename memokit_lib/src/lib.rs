//! Library layer for memokit: memoized calls over pluggable cache backends,
//! plus small call wrappers for retry, timing and refreshed singletons.
//!
//! Stores live in the `memokit_store` crate; this crate owns serialization,
//! key derivation, scene policy and backend resolution.

pub mod error;
pub mod fingerprint;
pub mod memoize;
pub mod registry;
pub mod retry;
pub mod scene;
pub mod settings;
pub mod singleton;
pub mod timing;

pub use memokit_store;
pub use memokit_store::{CacheBackend, SqliteStore, StoreError, TtlMap};

pub use error::MemoError;
pub use fingerprint::{compute_digest, derive_key, encode_call};
pub use memoize::{CannotCache, Memoize, MemoizeBuilder};
pub use registry::{
    global_cache_client, reset_global_cache_client, set_global_cache_client, CacheRegistry,
};
pub use retry::CatchException;
pub use scene::CacheScene;
pub use settings::MemoSettings;
pub use singleton::RefreshingSingleton;
pub use timing::TimeRecord;
