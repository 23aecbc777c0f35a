//! Cache tier trait definition.

use crate::error::StoreResult;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// What happened to a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// The key was written.
    Set,
    /// The key was deleted.
    Del,
    /// The key expired.
    Expired,
}

/// A keyspace notification.
///
/// Events carry only the key, not the value - the cache tier's pub/sub
/// channel does not include values, so observers re-read the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    /// The affected key.
    pub key: String,
    /// What happened.
    pub kind: CacheEventKind,
}

/// A live keyspace-notification subscription.
pub struct CacheSubscription {
    receiver: Receiver<CacheEvent>,
}

impl CacheSubscription {
    /// Wraps an event receiver.
    pub fn new(receiver: Receiver<CacheEvent>) -> Self {
        Self { receiver }
    }

    /// Returns the event receiver.
    pub fn receiver(&self) -> &Receiver<CacheEvent> {
        &self.receiver
    }
}

/// A key-value cache tier with optional per-key expiry.
///
/// Values are canonical text encodings (see `liverow_codec`). Key absence
/// is meaningful: a cache-value accessor represents "at the fallback" by
/// deleting the key.
pub trait CacheTier: Send + Sync {
    /// Reads a key. Absent or expired keys return `None`.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a key, with optional expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Deletes a key. Returns whether the key existed.
    fn del(&self, key: &str) -> StoreResult<bool>;

    /// Opens a keyspace-notification subscription.
    fn subscribe(&self) -> StoreResult<CacheSubscription>;
}
