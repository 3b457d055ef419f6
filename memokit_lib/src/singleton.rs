//! One shared instance per argument set, rebuilt after a timeout.
//!
//! Useful for clients holding a session that goes stale: every caller asking
//! with the same arguments gets the same `Arc<T>` until the timeout passes,
//! then the next caller builds a fresh one.

use std::any::type_name;
use std::sync::Arc;
use std::time::Duration;

use memokit_store::TtlMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::fingerprint::derive_key;

/// Default lifetime of a shared instance.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(5);

pub struct RefreshingSingleton<T> {
    instances: TtlMap<Arc<T>>,
    timeout: Duration,
    // Serializes construction so racing callers share one fresh instance.
    init_lock: Mutex<()>,
}

impl<T> RefreshingSingleton<T> {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REFRESH)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            instances: TtlMap::new(),
            timeout,
            init_lock: Mutex::new(()),
        }
    }

    /// Returns the live instance for `args`, building one with `init` if
    /// there is none or it has expired.
    ///
    /// Arguments that cannot be serialized get a fresh, unshared instance.
    pub fn get_or_init<A, F>(&self, args: &A, init: F) -> Arc<T>
    where
        A: Serialize + ?Sized,
        F: FnOnce(&A) -> T,
    {
        let type_path = type_name::<T>();
        let key = match derive_key(type_path, type_path, args) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("cannot fingerprint arguments for {}: {}", type_path, e);
                return Arc::new(init(args));
            }
        };
        if let Some(instance) = self.instances.get(&key) {
            return instance;
        }

        let _guard = self.init_lock.lock();
        if let Some(instance) = self.instances.get(&key) {
            return instance;
        }
        tracing::debug!("building new {} instance", type_path);
        self.instances
            .set(key, Arc::new(init(args)), self.timeout)
    }

    /// Drops every cached instance.
    pub fn clear(&self) {
        self.instances.clear();
    }
}

impl<T> Default for RefreshingSingleton<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Session {
        user: String,
        serial: usize,
    }

    #[test]
    fn same_arguments_share_an_instance() {
        let sessions = RefreshingSingleton::new();
        let a = sessions.get_or_init("alice", |u| Session { user: u.to_string(), serial: 1 });
        let b = sessions.get_or_init("alice", |u| Session { user: u.to_string(), serial: 2 });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.serial, 1);
    }

    #[test]
    fn different_arguments_get_different_instances() {
        let sessions = RefreshingSingleton::new();
        let a = sessions.get_or_init("alice", |u| Session { user: u.to_string(), serial: 1 });
        let b = sessions.get_or_init("bob", |u| Session { user: u.to_string(), serial: 2 });
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.user, "bob");
    }

    #[test]
    fn expired_instance_is_rebuilt() {
        let builds = AtomicUsize::new(0);
        let sessions = RefreshingSingleton::with_timeout(Duration::from_millis(1));
        let make = |u: &str| Session {
            user: u.to_string(),
            serial: builds.fetch_add(1, Ordering::SeqCst),
        };
        let first = sessions.get_or_init("alice", make);
        std::thread::sleep(Duration::from_millis(10));
        let second = sessions.get_or_init("alice", make);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_callers_build_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let sessions = Arc::new(RefreshingSingleton::<usize>::with_timeout(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let builds = Arc::clone(&builds);
                let sessions = Arc::clone(&sessions);
                std::thread::spawn(move || {
                    sessions.get_or_init(&("shared", 1), |_| builds.fetch_add(1, Ordering::SeqCst))
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
