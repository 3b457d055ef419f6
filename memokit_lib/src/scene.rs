//! Cache scenes: how a lookup interacts with calling the wrapped function.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MemoError;

/// Policy selecting whether a memoized call prefers the cache or the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScene {
    /// Prefer the cached value; call the function only on a miss.
    #[default]
    Default,
    /// Always call the function; fall back to the cache if it fails.
    Degraded,
    /// Always call the function and ignore the cache on read.
    Skip,
}

impl CacheScene {
    pub const ALL: [CacheScene; 3] = [CacheScene::Default, CacheScene::Degraded, CacheScene::Skip];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheScene::Default => "default",
            CacheScene::Degraded => "degraded",
            CacheScene::Skip => "skip",
        }
    }

    /// Whether the cache is consulted before calling the function.
    pub(crate) fn reads_first(&self) -> bool {
        matches!(self, CacheScene::Default)
    }

    /// Whether a failed call may be answered from the cache.
    pub(crate) fn falls_back(&self) -> bool {
        matches!(self, CacheScene::Degraded)
    }
}

impl fmt::Display for CacheScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheScene {
    type Err = MemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        CacheScene::ALL
            .into_iter()
            .find(|scene| scene.as_str() == normalized)
            .ok_or_else(|| MemoError::UnsupportedScene(s.to_string()))
    }
}
