//! The two-method contract a cache store must satisfy.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::StoreError;
use crate::ttl_map::TtlMap;

/// A store holding serialized values with per-key expiry.
///
/// Values are opaque strings; encoding and decoding belong to the caller.
/// Implementations must be shareable across threads.
pub trait CacheBackend: Send + Sync {
    /// Returns the stored string for `key`, or `None` if missing or expired.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, expiring after `ttl`.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

impl CacheBackend for TtlMap<String> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(TtlMap::get(self, key))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        TtlMap::set(self, key, value.to_string(), ttl);
        Ok(())
    }
}

impl<B: CacheBackend + ?Sized> CacheBackend for Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(backend: &dyn CacheBackend) -> Option<String> {
        backend
            .set("k", "\"v\"", Duration::from_secs(60))
            .expect("set");
        backend.get("k").expect("get")
    }

    #[test]
    fn ttl_map_satisfies_backend() {
        let map: TtlMap<String> = TtlMap::new();
        assert_eq!(roundtrip(&map), Some("\"v\"".to_string()));
    }

    #[test]
    fn arc_forwards_to_inner_backend() {
        let map: Arc<TtlMap<String>> = Arc::new(TtlMap::new());
        let shared: Arc<dyn CacheBackend> = map.clone();
        assert_eq!(roundtrip(&shared), Some("\"v\"".to_string()));
        assert_eq!(TtlMap::get(&map, "k"), Some("\"v\"".to_string()));
    }

    #[test]
    fn backend_miss_is_none() {
        let map: TtlMap<String> = TtlMap::new();
        let backend: &dyn CacheBackend = &map;
        assert_eq!(backend.get("missing").unwrap(), None);
    }
}
