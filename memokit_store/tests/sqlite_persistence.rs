use std::sync::Arc;
use std::time::Duration;

use memokit_store::{CacheBackend, SqliteStore};

#[test]
fn entries_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cache.db");

    {
        let store = SqliteStore::open(&path).expect("open");
        store.set("method:f:abc", "10", Duration::from_secs(60)).unwrap();
    }

    let reopened = SqliteStore::open(&path).expect("reopen");
    assert_eq!(reopened.get("method:f:abc").unwrap(), Some("10".to_string()));
}

#[test]
fn two_handles_share_one_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shared.db");

    let writer: Arc<dyn CacheBackend> = Arc::new(SqliteStore::open(&path).unwrap());
    let reader: Arc<dyn CacheBackend> = Arc::new(SqliteStore::open(&path).unwrap());

    writer.set("k", "[1,2,3]", Duration::from_secs(60)).unwrap();
    assert_eq!(reader.get("k").unwrap(), Some("[1,2,3]".to_string()));
}

#[test]
fn store_is_usable_across_threads() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..25 {
                    store
                        .set(&format!("{}:{}", t, i), &i.to_string(), Duration::from_secs(60))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(store.len().unwrap(), 100);
}
