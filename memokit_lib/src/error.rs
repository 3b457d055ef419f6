//! Error types for the library layer.

use std::fmt;

use memokit_store::StoreError;

/// Errors produced while configuring memokit or talking to a store directly.
///
/// Cache failures during a memoized call are logged, not returned; these
/// variants surface only from parsing, building and explicit store access.
#[derive(Debug)]
pub enum MemoError {
    /// A cache store operation failed.
    Store(StoreError),
    /// JSON serialization or deserialization failed.
    Serialization(serde_json::Error),
    /// A scene name that is not one of `default`, `degraded`, `skip`.
    UnsupportedScene(String),
    /// An option value has the wrong shape or range.
    InvalidConfig(String),
    /// A digest was requested over no input at all.
    EmptyDigestInput,
}

impl fmt::Display for MemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "Store error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::UnsupportedScene(s) => write!(f, "scene={} not supported", s),
            Self::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            Self::EmptyDigestInput => write!(f, "digest input must not be empty"),
        }
    }
}

impl std::error::Error for MemoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for MemoError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<serde_json::Error> for MemoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}
