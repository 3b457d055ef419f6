//! Error types for cache stores.

/// Errors a cache backend can report on read or write.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The SQLite store failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend refused to store the value.
    #[error("value rejected: {0}")]
    Rejected(String),
}
