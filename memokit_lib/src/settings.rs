//! Defaults for memoized calls, optionally overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::MemoError;
use crate::memoize::CannotCache;
use crate::scene::CacheScene;

/// Default entry lifetime.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest serialized result written to a backend (32 MiB).
pub const DEFAULT_CACHE_MAX_LENGTH: usize = 32 * 1024 * 1024;

/// Settings seeding a [`MemoizeBuilder`](crate::MemoizeBuilder).
#[derive(Clone, Debug)]
pub struct MemoSettings {
    pub timeout: Duration,
    pub cache_max_length: usize,
    pub scene: CacheScene,
    pub cannot_cache: CannotCache,
    /// When set, memoizers keep their local fallback in a SQLite file at this
    /// path instead of in memory.
    pub cache_db: Option<PathBuf>,
}

impl Default for MemoSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cache_max_length: DEFAULT_CACHE_MAX_LENGTH,
            scene: CacheScene::Default,
            cannot_cache: CannotCache::default(),
            cache_db: None,
        }
    }
}

impl MemoSettings {
    /// Reads overrides from `MEMOKIT_*` environment variables.
    ///
    /// Numbers that fail to parse keep their default. A bad scene name or a
    /// `MEMOKIT_CANNOT_CACHE` value that is not `null`, `false` or a JSON
    /// array is a configuration error.
    pub fn from_env() -> Result<Self, MemoError> {
        let defaults = Self::default();
        let scene = match env_string("MEMOKIT_CACHE_SCENE") {
            Some(raw) => raw.parse()?,
            None => defaults.scene,
        };
        let cannot_cache = match env_string("MEMOKIT_CANNOT_CACHE") {
            Some(raw) => {
                let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                    MemoError::InvalidConfig(format!("MEMOKIT_CANNOT_CACHE: {}", e))
                })?;
                CannotCache::from_value(value)?
            }
            None => defaults.cannot_cache,
        };
        Ok(Self {
            timeout: Duration::from_secs(env_u64(
                "MEMOKIT_CACHE_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )),
            cache_max_length: env_usize("MEMOKIT_CACHE_MAX_LENGTH", defaults.cache_max_length),
            scene,
            cannot_cache,
            cache_db: env_string("MEMOKIT_CACHE_DB").map(PathBuf::from),
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|val| !val.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(default)
}
