//! Redis cache tier.

use crate::cache::{CacheEvent, CacheEventKind, CacheSubscription, CacheTier};
use crate::error::StoreResult;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache tier backed by Redis.
///
/// Values are stored as plain strings; TTLs map to `SET ... EX`. External
/// mutation is observed through keyspace notifications on a dedicated
/// pub/sub connection.
pub struct RedisCache {
    client: redis::Client,
    connection: Mutex<redis::Connection>,
}

impl RedisCache {
    /// Connects to the given Redis URL (e.g. `redis://localhost:6379`).
    pub fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(crate::StoreError::from)?;
        let connection = client.get_connection()?;
        Ok(Self {
            client,
            connection: Mutex::new(connection),
        })
    }

    fn event_kind(operation: &str) -> Option<CacheEventKind> {
        match operation {
            "set" => Some(CacheEventKind::Set),
            "del" => Some(CacheEventKind::Del),
            "expired" => Some(CacheEventKind::Expired),
            _ => None,
        }
    }
}

impl CacheTier for RedisCache {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut connection = self.connection.lock();
        Ok(redis::cmd("GET").arg(key).query(&mut connection)?)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut connection = self.connection.lock();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query::<()>(&mut connection)?;
        Ok(())
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let mut connection = self.connection.lock();
        let removed: i64 = redis::cmd("DEL").arg(key).query(&mut connection)?;
        Ok(removed > 0)
    }

    fn subscribe(&self) -> StoreResult<CacheSubscription> {
        // Keyspace notifications are off by default; enable them
        // best-effort (managed servers may reject CONFIG).
        {
            let mut connection = self.connection.lock();
            if let Err(e) = redis::cmd("CONFIG")
                .arg("SET")
                .arg("notify-keyspace-events")
                .arg("KEA")
                .query::<()>(&mut connection)
            {
                debug!(error = %e, "could not enable keyspace notifications");
            }
        }

        let mut connection = self.client.get_connection()?;
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("liverow-redis-sub".to_owned())
            .spawn(move || {
                let mut pubsub = connection.as_pubsub();
                if let Err(e) = pubsub.psubscribe("__keyspace@*__:*") {
                    warn!(error = %e, "keyspace subscription failed");
                    return;
                }
                loop {
                    let message = match pubsub.get_message() {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(error = %e, "keyspace subscription lost");
                            break;
                        }
                    };
                    let channel = message.get_channel_name().to_owned();
                    let Some((_, key)) = channel.split_once(':') else {
                        continue;
                    };
                    let operation: String = match message.get_payload() {
                        Ok(operation) => operation,
                        Err(_) => continue,
                    };
                    let Some(kind) = Self::event_kind(&operation) else {
                        continue;
                    };
                    let event = CacheEvent {
                        key: key.to_owned(),
                        kind,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| crate::StoreError::connection(e.to_string()))?;
        Ok(CacheSubscription::new(rx))
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}
