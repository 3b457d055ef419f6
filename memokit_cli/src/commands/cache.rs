use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use memokit_lib::SqliteStore;

use crate::output::{print_entries_table, print_json, print_value, EntryRow, OutputFormat};

const DEFAULT_DB: &str = "memokit-cache.db";

#[derive(Args)]
pub struct CacheArgs {
    /// SQLite cache file (defaults to MEMOKIT_CACHE_DB, then memokit-cache.db)
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Print the value stored under a key
    Get { key: String },
    /// Store a value under a key
    Set {
        key: String,
        value: String,
        /// Entry lifetime in seconds
        #[arg(long, default_value = "300")]
        ttl: u64,
    },
    /// Remove a key
    Delete { key: String },
    /// List live entries
    List,
    /// Remove expired entries
    Sweep,
    /// Remove every entry
    Clear,
}

pub fn run(args: &CacheArgs, format: &OutputFormat) -> Result<()> {
    let path = resolve_db_path(args.db.as_ref());
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open cache store {}", path.display()))?;

    match &args.action {
        CacheAction::Get { key } => {
            let value = store.get(key)?;
            match format {
                OutputFormat::Table => match &value {
                    Some(value) => print_value(value),
                    None => eprintln!("No entry for '{}'", key),
                },
                OutputFormat::Json => {
                    print_json(&serde_json::json!({ "key": key, "value": value }))
                }
            }
        }
        CacheAction::Set { key, value, ttl } => {
            store.set(key, value, Duration::from_secs(*ttl))?;
            match format {
                OutputFormat::Table => eprintln!("Stored '{}' for {}s", key, ttl),
                OutputFormat::Json => {
                    print_json(&serde_json::json!({ "key": key, "ttl_secs": ttl }))
                }
            }
        }
        CacheAction::Delete { key } => {
            let deleted = store.delete(key)?;
            match format {
                OutputFormat::Table if deleted => eprintln!("Deleted '{}'", key),
                OutputFormat::Table => eprintln!("No entry for '{}'", key),
                OutputFormat::Json => {
                    print_json(&serde_json::json!({ "key": key, "deleted": deleted }))
                }
            }
        }
        CacheAction::List => {
            let entries = store.entries()?;
            match format {
                OutputFormat::Table => print_entries_table(&entries),
                OutputFormat::Json => print_json(&EntryRow::from_entries(&entries)),
            }
        }
        CacheAction::Sweep => print_removed(store.sweep()?, "expired", format),
        CacheAction::Clear => print_removed(store.clear()?, "", format),
    }

    Ok(())
}

fn resolve_db_path(flag: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path.clone();
    }
    std::env::var("MEMOKIT_CACHE_DB")
        .ok()
        .filter(|val| !val.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB))
}

fn print_removed(removed: usize, kind: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Table if kind.is_empty() => eprintln!("Removed {} entries", removed),
        OutputFormat::Table => eprintln!("Removed {} {} entries", removed, kind),
        OutputFormat::Json => print_json(&serde_json::json!({ "removed": removed })),
    }
}
