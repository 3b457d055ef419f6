//! Memoized calls over a pluggable cache backend.
//!
//! [`Memoize`] wraps a function `Fn(&A) -> Result<T, E>`. Results are stored
//! as compact JSON under a key that is either given, computed from the
//! arguments, or derived from the call site and arguments (see
//! [`derive_key`](crate::fingerprint::derive_key)). Caching is best-effort:
//! store failures, undecodable entries and oversized results are logged and
//! never change what the caller sees. The only substitution is the
//! [`CacheScene::Degraded`] fallback, where a cached value replaces an error.
//!
//! The backend for each call is, in order: the client given to the builder,
//! the client held by the registry, then a store local to this memoizer.
//!
//! ```
//! use std::convert::Infallible;
//! use memokit_lib::{CacheRegistry, Memoize};
//!
//! fn double(x: &i64) -> Result<i64, Infallible> {
//!     Ok(x * 2)
//! }
//!
//! let memo = Memoize::builder(double)
//!     .registry(CacheRegistry::new())
//!     .build()
//!     .unwrap();
//! assert_eq!(memo.call(&5).unwrap(), 10);
//! assert_eq!(memo.call(&5).unwrap(), 10);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use memokit_store::{CacheBackend, SqliteStore, TtlMap};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::MemoError;
use crate::fingerprint::derive_key;
use crate::registry::CacheRegistry;
use crate::scene::CacheScene;
use crate::settings::MemoSettings;

/// Which results must never be written to the cache.
///
/// Checks run against the JSON form of a value, both before a write and on
/// every hit, so a cached value that the policy rejects counts as a miss.
#[derive(Clone)]
pub enum CannotCache {
    /// Cache every result.
    Never,
    /// Skip results for which the predicate returns true.
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
    /// Skip results equal to one of these values. Equality is JSON equality,
    /// so `0` does not match `false`.
    Excluded(Vec<Value>),
}

impl CannotCache {
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    pub fn excluded(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Excluded(values.into_iter().collect())
    }

    /// Reads the policy from a JSON value: `null` or `false` caches
    /// everything, an array lists excluded values.
    pub fn from_value(value: Value) -> Result<Self, MemoError> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Self::Never),
            Value::Array(values) => Ok(Self::Excluded(values)),
            other => Err(MemoError::InvalidConfig(format!(
                "cannot_cache={} does not meet the requirements",
                other
            ))),
        }
    }

    /// Whether `value` may be cached.
    pub fn allows(&self, value: &Value) -> bool {
        match self {
            Self::Never => true,
            Self::Predicate(f) => !f(value),
            Self::Excluded(values) => !values.contains(value),
        }
    }
}

impl Default for CannotCache {
    fn default() -> Self {
        Self::Excluded(vec![Value::Null, Value::Bool(false)])
    }
}

impl fmt::Debug for CannotCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Excluded(values) => f.debug_tuple("Excluded").field(values).finish(),
        }
    }
}

enum KeySource<A: ?Sized> {
    Derived,
    Literal(String),
    Computed(Arc<dyn Fn(&A) -> String + Send + Sync>),
}

/// Builder for [`Memoize`]. Start with [`Memoize::builder`].
pub struct MemoizeBuilder<A: ?Sized, T, E, F> {
    func: F,
    name: Option<String>,
    location: Option<String>,
    key: KeySource<A>,
    settings: MemoSettings,
    cache_client: Option<Arc<dyn CacheBackend>>,
    registry: Option<CacheRegistry>,
    caller: &'static Location<'static>,
    _marker: PhantomData<fn(&A) -> Result<T, E>>,
}

impl<A: ?Sized, T, E, F> MemoizeBuilder<A, T, E, F> {
    /// Uses `key` for every call regardless of arguments.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = KeySource::Literal(key.into());
        self
    }

    /// Computes the key from the call's arguments.
    pub fn key_fn(mut self, f: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key = KeySource::Computed(Arc::new(f));
        self
    }

    /// Replaces timeout, scene, cannot_cache, max length and local store path
    /// with the values in `settings`. Call before the individual setters.
    pub fn settings(mut self, settings: MemoSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Scene used by [`Memoize::call`].
    pub fn scene(mut self, scene: CacheScene) -> Self {
        self.settings.scene = scene;
        self
    }

    pub fn cannot_cache(mut self, cannot_cache: CannotCache) -> Self {
        self.settings.cannot_cache = cannot_cache;
        self
    }

    /// Largest serialized result, in bytes, that will be written.
    pub fn cache_max_length(mut self, max: usize) -> Self {
        self.settings.cache_max_length = max;
        self
    }

    /// Keeps the local fallback in a SQLite file instead of memory.
    pub fn local_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.cache_db = Some(path.into());
        self
    }

    /// Backend used for every call, ahead of the registry.
    pub fn cache_client(mut self, client: Arc<dyn CacheBackend>) -> Self {
        self.cache_client = Some(client);
        self
    }

    /// Registry consulted when no explicit client is set. Defaults to
    /// [`CacheRegistry::global`].
    pub fn registry(mut self, registry: CacheRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Function name used in derived keys.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Call-site identity used in derived keys.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn build(self) -> Result<Memoize<A, T, E, F>, MemoError> {
        let settings = self.settings;
        if settings.timeout.is_zero() {
            return Err(MemoError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if settings.cache_max_length == 0 {
            return Err(MemoError::InvalidConfig(
                "cache_max_length must be greater than zero".to_string(),
            ));
        }

        // An explicit client always wins, so its fallback is never read.
        let fallback: Arc<dyn CacheBackend> = match (&settings.cache_db, &self.cache_client) {
            (Some(path), None) => Arc::new(SqliteStore::open(path)?),
            _ => Arc::new(TtlMap::<String>::new()),
        };

        let (default_name, default_location) = callable_identity::<F>(self.caller);
        Ok(Memoize {
            func: self.func,
            name: self.name.unwrap_or(default_name),
            location: self.location.unwrap_or(default_location),
            key: self.key,
            timeout: settings.timeout,
            scene: settings.scene,
            cannot_cache: settings.cannot_cache,
            cache_client: self.cache_client,
            registry: self
                .registry
                .unwrap_or_else(|| CacheRegistry::global().clone()),
            fallback,
            cache_max_length: settings.cache_max_length,
            _marker: PhantomData,
        })
    }
}

/// A function whose results are cached. Build one with [`Memoize::builder`].
pub struct Memoize<A: ?Sized, T, E, F> {
    func: F,
    name: String,
    location: String,
    key: KeySource<A>,
    timeout: Duration,
    scene: CacheScene,
    cannot_cache: CannotCache,
    cache_client: Option<Arc<dyn CacheBackend>>,
    registry: CacheRegistry,
    fallback: Arc<dyn CacheBackend>,
    cache_max_length: usize,
    _marker: PhantomData<fn(&A) -> Result<T, E>>,
}

impl<A: ?Sized, T, E, F> Memoize<A, T, E, F>
where
    F: Fn(&A) -> Result<T, E>,
{
    /// Starts building a memoizer around `func`.
    ///
    /// The default name and location come from `func`'s type path. Closures
    /// share a path with every other closure in the same function, so their
    /// location also records where `builder` was called.
    #[track_caller]
    pub fn builder(func: F) -> MemoizeBuilder<A, T, E, F> {
        MemoizeBuilder {
            func,
            name: None,
            location: None,
            key: KeySource::Derived,
            settings: MemoSettings::default(),
            cache_client: None,
            registry: None,
            caller: Location::caller(),
            _marker: PhantomData,
        }
    }
}

impl<A, T, E, F> Memoize<A, T, E, F>
where
    A: Serialize + ?Sized,
    T: Serialize + DeserializeOwned,
    F: Fn(&A) -> Result<T, E>,
{
    /// Calls with the scene configured at build time.
    pub fn call(&self, args: &A) -> Result<T, E> {
        self.call_with(args, self.scene)
    }

    /// Calls with an explicit scene for this call only.
    pub fn call_with(&self, args: &A, scene: CacheScene) -> Result<T, E> {
        // Derived once; the degraded fallback must read the same entry.
        let Some(key) = self.cache_key(args) else {
            return (self.func)(args);
        };
        let client = self.resolve_client();

        if scene.reads_first() {
            if let Some(hit) = self.load(client.as_ref(), &key) {
                tracing::debug!("cache hit key={}", key);
                return Ok(hit);
            }
        }

        match (self.func)(args) {
            Ok(ret) => {
                self.store(client.as_ref(), &key, &ret);
                Ok(ret)
            }
            Err(err) => {
                if scene.falls_back() {
                    if let Some(cached) = self.load(client.as_ref(), &key) {
                        tracing::warn!(
                            "{} failed, serving cached value for key={}",
                            self.location,
                            key
                        );
                        return Ok(cached);
                    }
                }
                Err(err)
            }
        }
    }

    /// The cache key a call with `args` would use, or `None` if the
    /// arguments cannot be serialized for key derivation.
    pub fn cache_key(&self, args: &A) -> Option<String> {
        match &self.key {
            KeySource::Literal(key) => Some(key.clone()),
            KeySource::Computed(f) => Some(f(args)),
            KeySource::Derived => match derive_key(&self.name, &self.location, args) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::error!(
                        "cannot derive cache key for {}, calling uncached: {}",
                        self.location,
                        e
                    );
                    None
                }
            },
        }
    }

    fn load(&self, client: &dyn CacheBackend, key: &str) -> Option<T> {
        let raw = match client.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("load cache_data error key={}: {}", key, e);
                return None;
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("load cache_data error key={}: {}", key, e);
                return None;
            }
        };
        if !self.cannot_cache.allows(&value) {
            return None;
        }
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::error!("load cache_data error key={}: {}", key, e);
                None
            }
        }
    }

    fn store(&self, client: &dyn CacheBackend, key: &str, ret: &T) {
        let value = match serde_json::to_value(ret) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("set cache_data error key={}: {}", key, e);
                return;
            }
        };
        if !self.cannot_cache.allows(&value) {
            return;
        }
        let encoded = value.to_string();
        if encoded.len() > self.cache_max_length {
            tracing::warn!(
                "Cache too long, key={} length={} limit is {}",
                key,
                encoded.len(),
                self.cache_max_length
            );
            return;
        }
        if let Err(e) = client.set(key, &encoded, self.timeout) {
            tracing::error!("set cache_data error key={}: {}", key, e);
        }
    }
}

impl<A: ?Sized, T, E, F> Memoize<A, T, E, F> {
    fn resolve_client(&self) -> Arc<dyn CacheBackend> {
        self.cache_client
            .clone()
            .or_else(|| self.registry.get())
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn default_scene(&self) -> CacheScene {
        self.scene
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<A: ?Sized, T, E, F> fmt::Debug for Memoize<A, T, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoize")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("timeout", &self.timeout)
            .field("scene", &self.scene)
            .field("cannot_cache", &self.cannot_cache)
            .field("cache_max_length", &self.cache_max_length)
            .finish_non_exhaustive()
    }
}

/// Name and location for a callable type, e.g. `double` and `app::math::double`.
fn callable_identity<F>(caller: &Location<'_>) -> (String, String) {
    let path = std::any::type_name::<F>();
    let base = path.split('<').next().unwrap_or(path);
    let name = base
        .rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with("{{"))
        .unwrap_or(base)
        .to_string();
    let location = if path.contains("{{closure}}") {
        format!(
            "{}@{}:{}:{}",
            path,
            caller.file(),
            caller.line(),
            caller.column()
        )
    } else {
        path.to_string()
    };
    (name, location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memokit_store::StoreError;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn double(x: &i64) -> Result<i64, Infallible> {
        Ok(x * 2)
    }

    fn local_map() -> Arc<TtlMap<String>> {
        Arc::new(TtlMap::new())
    }

    struct Unreachable;

    impl CacheBackend for Unreachable {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn fn_item_identity_uses_type_path() {
        let memo = Memoize::builder(double)
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        assert_eq!(memo.name(), "double");
        assert_eq!(memo.location(), "memokit_lib::memoize::tests::double");
    }

    #[test]
    fn closures_on_different_lines_get_different_locations() {
        let a = Memoize::builder(|x: &i64| Ok::<_, Infallible>(*x))
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        let b = Memoize::builder(|x: &i64| Ok::<_, Infallible>(*x + 1))
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        assert_ne!(a.location(), b.location());
        assert_ne!(a.cache_key(&1), b.cache_key(&1));
        assert!(a.location().contains("memoize.rs"));
    }

    #[test]
    fn derived_key_is_stable_per_arguments() {
        let memo = Memoize::builder(double)
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        assert_eq!(memo.cache_key(&5), memo.cache_key(&5));
        assert_ne!(memo.cache_key(&5), memo.cache_key(&6));
        assert!(memo.cache_key(&5).unwrap().starts_with("method:double:"));
    }

    #[test]
    fn literal_and_computed_keys() {
        let literal = Memoize::builder(double)
            .key("fixed")
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        assert_eq!(literal.cache_key(&1).as_deref(), Some("fixed"));

        let computed = Memoize::builder(double)
            .key_fn(|x: &i64| format!("double:{}", x))
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        assert_eq!(computed.cache_key(&7).as_deref(), Some("double:7"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Memoize::builder(double)
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, MemoError::InvalidConfig(_)));
    }

    #[test]
    fn zero_max_length_is_rejected() {
        let err = Memoize::builder(double)
            .cache_max_length(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, MemoError::InvalidConfig(_)));
    }

    #[test]
    fn huge_timeout_still_returns_and_caches() {
        let backend = local_map();
        let memo = Memoize::builder(double)
            .timeout(Duration::from_secs(u64::MAX))
            .cache_client(backend.clone())
            .registry(CacheRegistry::new())
            .build()
            .unwrap();

        assert_eq!(memo.call(&5).unwrap(), 10);
        let key = memo.cache_key(&5).unwrap();
        assert_eq!(TtlMap::get(&backend, &key), Some("10".to_string()));
    }

    #[test]
    fn explicit_client_skips_local_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let unopenable = dir.path().join("missing").join("nested").join("memo.db");
        let memo = Memoize::builder(double)
            .local_store_path(&unopenable)
            .cache_client(local_map())
            .registry(CacheRegistry::new())
            .build()
            .unwrap();

        assert_eq!(memo.call(&2).unwrap(), 4);
        assert!(!unopenable.exists());
    }

    #[test]
    fn cannot_cache_from_value_shapes() {
        assert!(matches!(
            CannotCache::from_value(Value::Null).unwrap(),
            CannotCache::Never
        ));
        assert!(matches!(
            CannotCache::from_value(Value::Bool(false)).unwrap(),
            CannotCache::Never
        ));
        let excluded = CannotCache::from_value(serde_json::json!([null, 0])).unwrap();
        assert!(!excluded.allows(&serde_json::json!(0)));
        assert!(excluded.allows(&serde_json::json!(false)));
        assert!(matches!(
            CannotCache::from_value(serde_json::json!("none")),
            Err(MemoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn default_cannot_cache_keeps_zero() {
        let policy = CannotCache::default();
        assert!(!policy.allows(&Value::Null));
        assert!(!policy.allows(&Value::Bool(false)));
        assert!(policy.allows(&serde_json::json!(0)));
        assert!(policy.allows(&serde_json::json!("")));
    }

    #[test]
    fn default_scene_returns_cached_value_without_calling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let backend = local_map();
        let memo = Memoize::builder(move |x: &i64| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(x * 2)
        })
        .cache_client(backend.clone())
        .registry(CacheRegistry::new())
        .build()
        .unwrap();

        let key = memo.cache_key(&5).unwrap();
        TtlMap::set(&backend, key.as_str(), "99".to_string(), Duration::from_secs(60));

        assert_eq!(memo.call(&5).unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn skip_scene_always_calls_and_overwrites() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let backend = local_map();
        let memo = Memoize::builder(move |x: &i64| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(x * 2)
        })
        .cache_client(backend.clone())
        .registry(CacheRegistry::new())
        .build()
        .unwrap();

        let key = memo.cache_key(&5).unwrap();
        TtlMap::set(&backend, key.as_str(), "99".to_string(), Duration::from_secs(60));

        assert_eq!(memo.call_with(&5, CacheScene::Skip).unwrap(), 10);
        assert_eq!(memo.call_with(&5, CacheScene::Skip).unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(TtlMap::get(&backend, &key), Some("10".to_string()));
    }

    #[test]
    fn degraded_scene_serves_cache_on_failure() {
        let failing = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failing);
        let backend = local_map();
        let memo = Memoize::builder(move |x: &i64| {
            if flag.load(Ordering::SeqCst) {
                Err("upstream down".to_string())
            } else {
                Ok(x * 2)
            }
        })
        .scene(CacheScene::Degraded)
        .cache_client(backend.clone())
        .registry(CacheRegistry::new())
        .build()
        .unwrap();

        assert_eq!(memo.call(&5), Ok(10));
        failing.store(true, Ordering::SeqCst);
        assert_eq!(memo.call(&5), Ok(10));
        assert_eq!(memo.call(&6), Err("upstream down".to_string()));
    }

    #[test]
    fn skip_scene_propagates_error_even_with_cache() {
        let failing = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failing);
        let backend = local_map();
        let memo = Memoize::builder(move |x: &i64| {
            if flag.load(Ordering::SeqCst) {
                Err("boom".to_string())
            } else {
                Ok(x * 2)
            }
        })
        .cache_client(backend.clone())
        .registry(CacheRegistry::new())
        .build()
        .unwrap();

        assert_eq!(memo.call(&5), Ok(10));
        failing.store(true, Ordering::SeqCst);
        assert_eq!(memo.call_with(&5, CacheScene::Skip), Err("boom".to_string()));
    }

    #[test]
    fn unreachable_backend_is_a_miss() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let memo = Memoize::builder(move |x: &i64| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(x * 2)
        })
        .cache_client(Arc::new(Unreachable))
        .registry(CacheRegistry::new())
        .build()
        .unwrap();

        assert_eq!(memo.call(&5).unwrap(), 10);
        assert_eq!(memo.call(&5).unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn corrupt_entry_is_a_miss_and_gets_replaced() {
        let backend = local_map();
        let memo = Memoize::builder(double)
            .cache_client(backend.clone())
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        let key = memo.cache_key(&5).unwrap();
        TtlMap::set(&backend, key.as_str(), "{not json".to_string(), Duration::from_secs(60));

        assert_eq!(memo.call(&5).unwrap(), 10);
        assert_eq!(TtlMap::get(&backend, &key), Some("10".to_string()));
    }

    #[test]
    fn cached_value_of_wrong_shape_is_a_miss() {
        let backend = local_map();
        let memo = Memoize::builder(double)
            .cache_client(backend.clone())
            .registry(CacheRegistry::new())
            .build()
            .unwrap();
        let key = memo.cache_key(&5).unwrap();
        TtlMap::set(&backend, key.as_str(), "\"ten\"".to_string(), Duration::from_secs(60));

        assert_eq!(memo.call(&5).unwrap(), 10);
    }

    #[test]
    fn excluded_hit_is_treated_as_miss() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let backend = local_map();
        let memo = Memoize::builder(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<i64>, Infallible>(Some(1))
        })
        .cache_client(backend.clone())
        .registry(CacheRegistry::new())
        .build()
        .unwrap();
        let key = memo.cache_key(&()).unwrap();
        TtlMap::set(&backend, key.as_str(), "null".to_string(), Duration::from_secs(60));

        assert_eq!(memo.call(&()).unwrap(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
