use chrono::{DateTime, Utc};
use memokit_lib::memokit_store::StoredEntry;
use serde::Serialize;
use tabled::{Table, Tabled};

const VALUE_PREVIEW_CHARS: usize = 48;

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize)]
pub struct EntryRow {
    #[tabled(rename = "Key")]
    #[serde(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    #[serde(rename = "Value")]
    value: String,
    #[tabled(rename = "Expires At")]
    #[serde(rename = "Expires At")]
    expires_at: String,
    #[tabled(rename = "TTL")]
    #[serde(rename = "TTL")]
    ttl: String,
}

impl EntryRow {
    /// JSON rows carry the full value; only the table truncates it.
    pub fn from_entries(entries: &[StoredEntry]) -> Vec<EntryRow> {
        build_entry_rows(entries, Utc::now(), usize::MAX)
    }
}

// -- Row builders --

fn build_entry_rows(
    entries: &[StoredEntry],
    now: DateTime<Utc>,
    max_value_chars: usize,
) -> Vec<EntryRow> {
    entries
        .iter()
        .map(|e| EntryRow {
            key: e.key.clone(),
            value: truncate(&e.value, max_value_chars),
            expires_at: e.expires_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ttl: format_remaining(e.expires_at, now),
        })
        .collect()
}

// -- Table output --

pub fn print_entries_table(entries: &[StoredEntry]) {
    if entries.is_empty() {
        eprintln!("Cache is empty");
        return;
    }
    println!(
        "{}",
        Table::new(build_entry_rows(entries, Utc::now(), VALUE_PREVIEW_CHARS))
    );
}

pub fn print_value(value: &str) {
    println!("{}", value);
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn format_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (expires_at - now).num_seconds();
    if secs <= 0 {
        "expired".to_string()
    } else if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
