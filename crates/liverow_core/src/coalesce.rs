//! Write coalescing for interval-declared scalar columns.

use crate::instance::UniqueInstance;
use liverow_codec::Value;
use liverow_schema::{ColumnDescriptor, TableRef};
use liverow_store::RelationalStore;
use liverow_sql::{ColumnValue, DmlOp, Eq};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    table: String,
    column: String,
    ids: Vec<(String, String)>,
}

struct PendingWrite {
    table: TableRef,
    column: String,
    filter: Vec<(String, Value)>,
    value: Value,
    due: Instant,
}

/// Coalesces writes for columns declaring an update interval.
///
/// The first write to a (row, column) starts the interval; later writes
/// within it replace the pending value without extending the deadline.
/// Only the last value is flushed when the interval elapses.
#[derive(Default)]
pub(crate) struct Coalescer {
    pending: Mutex<HashMap<PendingKey, PendingWrite>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a write, replacing any pending value for the same column.
    pub fn enqueue(
        &self,
        instance: &Arc<UniqueInstance>,
        table: TableRef,
        column: &ColumnDescriptor,
        value: Value,
        interval: Duration,
    ) {
        let descriptor = instance.descriptor();
        let key = PendingKey {
            table: table.qualified(),
            column: column.column.clone(),
            ids: instance.row_key().ids.clone(),
        };
        let filter: Vec<(String, Value)> = descriptor
            .id_columns
            .iter()
            .zip(instance.ids().iter())
            .map(|(id, value)| (id.column.clone(), value.clone()))
            .collect();

        let mut pending = self.pending.lock();
        match pending.get_mut(&key) {
            Some(existing) => existing.value = value,
            None => {
                pending.insert(
                    key,
                    PendingWrite {
                        table,
                        column: column.column.clone(),
                        filter,
                        value,
                        due: Instant::now() + interval,
                    },
                );
            }
        }
    }

    /// Flushes writes whose interval has elapsed. Returns the flush count.
    pub fn flush_due(&self, store: &dyn RelationalStore) -> usize {
        self.flush(store, false)
    }

    /// Flushes every pending write immediately.
    pub fn flush_all(&self, store: &dyn RelationalStore) -> usize {
        self.flush(store, true)
    }

    fn flush(&self, store: &dyn RelationalStore, all: bool) -> usize {
        let now = Instant::now();
        let due: Vec<PendingWrite> = {
            let mut pending = self.pending.lock();
            let keys: Vec<PendingKey> = pending
                .iter()
                .filter(|(_, write)| all || write.due <= now)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter().filter_map(|key| pending.remove(&key)).collect()
        };

        let mut flushed = 0;
        for write in due {
            let op = DmlOp::Update {
                table: write.table.clone(),
                set: vec![ColumnValue::new(write.column.clone(), write.value.clone())],
                filter: write
                    .filter
                    .iter()
                    .map(|(column, value)| Eq::base(column.clone(), value.clone()))
                    .collect(),
            };
            match store.execute(&op) {
                Ok(_) => flushed += 1,
                Err(e) => {
                    warn!(table = %write.table.qualified(), column = %write.column, error = %e,
                        "coalesced write failed");
                }
            }
        }
        flushed
    }

    /// Returns the number of pending writes.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
