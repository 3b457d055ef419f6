//! Shared cache client used when a memoized call has no explicit client.
//!
//! [`CacheRegistry::global`] is the process-wide registry every memoizer
//! consults by default. Tests build their own with [`CacheRegistry::new`] and
//! hand it to the builder, leaving the global one untouched.

use std::fmt;
use std::sync::Arc;

use memokit_store::CacheBackend;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

static GLOBAL: Lazy<CacheRegistry> = Lazy::new(CacheRegistry::new);

/// A cloneable handle to an optional shared cache client.
///
/// Clones share the same slot, so setting a client through one handle is
/// visible through every other.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    client: Arc<RwLock<Option<Arc<dyn CacheBackend>>>>,
}

impl CacheRegistry {
    /// Creates an empty registry, independent of the global one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static CacheRegistry {
        &GLOBAL
    }

    pub fn set(&self, client: Arc<dyn CacheBackend>) {
        *self.client.write() = Some(client);
    }

    pub fn get(&self) -> Option<Arc<dyn CacheBackend>> {
        self.client.read().clone()
    }

    /// Removes the client; memoizers fall back to their local store again.
    pub fn reset(&self) {
        *self.client.write() = None;
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("has_client", &self.client.read().is_some())
            .finish()
    }
}

/// Installs `client` as the process-wide cache client.
pub fn set_global_cache_client(client: Arc<dyn CacheBackend>) {
    CacheRegistry::global().set(client);
}

/// Returns the process-wide cache client, if one was installed.
pub fn global_cache_client() -> Option<Arc<dyn CacheBackend>> {
    CacheRegistry::global().get()
}

pub fn reset_global_cache_client() {
    CacheRegistry::global().reset();
}
