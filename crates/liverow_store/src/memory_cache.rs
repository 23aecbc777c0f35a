//! In-memory cache tier for testing.

use crate::cache::{CacheEvent, CacheEventKind, CacheSubscription, CacheTier};
use crate::error::StoreResult;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};

/// An in-memory cache tier.
///
/// TTLs are enforced lazily: an expired entry is removed (and its expiry
/// event published) the next time it is read or overwritten.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    subscribers: RwLock<Vec<Sender<CacheEvent>>>,
}

struct Entry {
    value: String,
    deadline: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    fn publish(&self, key: &str, kind: CacheEventKind) {
        let event = CacheEvent {
            key: key.to_owned(),
            kind,
        };
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheTier for MemoryCache {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                drop(entries);
                self.publish(key, CacheEventKind::Expired);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry {
            value: value.to_owned(),
            deadline: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_owned(), entry);
        self.publish(key, CacheEventKind::Set);
        Ok(())
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let existed = self.entries.lock().remove(key).is_some();
        if existed {
            self.publish(key, CacheEventKind::Del);
        }
        Ok(existed)
    }

    fn subscribe(&self) -> StoreResult<CacheSubscription> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        Ok(CacheSubscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_get_del() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").unwrap(), None);
        cache.set("k", "v", None).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some("v".to_owned()));
        assert!(cache.del("k").unwrap());
        assert!(!cache.del("k").unwrap());
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn ttl_expires_key() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(cache.get("k").unwrap(), Some("v".to_owned()));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k").unwrap(), None);
        // The key is gone, not just hidden.
        assert!(!cache.del("k").unwrap());
    }

    #[test]
    fn events_published() {
        let cache = MemoryCache::new();
        let subscription = cache.subscribe().unwrap();
        cache.set("k", "v", None).unwrap();
        cache.del("k").unwrap();

        let first = subscription.receiver().recv().unwrap();
        assert_eq!(first.kind, CacheEventKind::Set);
        assert_eq!(first.key, "k");
        let second = subscription.receiver().recv().unwrap();
        assert_eq!(second.kind, CacheEventKind::Del);
    }

    #[test]
    fn expiry_event_published_on_read() {
        let cache = MemoryCache::new();
        let subscription = cache.subscribe().unwrap();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .unwrap();
        subscription.receiver().recv().unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k").unwrap(), None);
        let event = subscription.receiver().recv().unwrap();
        assert_eq!(event.kind, CacheEventKind::Expired);
    }
}
