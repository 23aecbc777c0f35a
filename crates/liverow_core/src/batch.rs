//! Transactional batch-insert coordinator.

use crate::engine::EngineShared;
use crate::error::{CoreError, CoreResult};
use crate::instance::UniqueInstance;
use liverow_codec::Value;
use liverow_schema::{EntityType, TypeDescriptor};
use liverow_sql::{insert_row, ColumnValue, DmlOp};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How `commit` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Block until the transaction completes.
    Sync,
    /// Return immediately; tickets resolve on a background completion.
    Async,
}

struct TicketState {
    slot: Mutex<Option<Result<Arc<UniqueInstance>, String>>>,
    ready: Condvar,
}

/// A future resolved with the fully-populated instance after the batch
/// commits, or failed with the batch's error.
pub struct InsertTicket {
    state: Arc<TicketState>,
}

impl InsertTicket {
    fn new() -> (Self, Arc<TicketState>) {
        let state = Arc::new(TicketState {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }

    /// Blocks until the batch commits or the timeout elapses.
    pub fn wait(&self, timeout: Duration) -> CoreResult<Arc<UniqueInstance>> {
        let mut slot = self.state.slot.lock();
        if slot.is_none() && self.state.ready.wait_for(&mut slot, timeout).timed_out() {
            return Err(CoreError::Timeout);
        }
        match slot.as_ref() {
            Some(Ok(instance)) => Ok(Arc::clone(instance)),
            Some(Err(message)) => Err(CoreError::transaction(message.clone())),
            None => Err(CoreError::Timeout),
        }
    }

    /// Returns the result if the batch already completed.
    pub fn try_get(&self) -> Option<CoreResult<Arc<UniqueInstance>>> {
        let slot = self.state.slot.lock();
        slot.as_ref().map(|result| match result {
            Ok(instance) => Ok(Arc::clone(instance)),
            Err(message) => Err(CoreError::transaction(message.clone())),
        })
    }
}

struct PendingRow {
    descriptor: Arc<TypeDescriptor>,
    ids: Vec<Value>,
    fields: Vec<(String, Value)>,
    ticket: Arc<TicketState>,
}

type PostInsertAction = Box<dyn FnOnce() -> CoreResult<Vec<DmlOp>> + Send>;

/// One atomic multi-row insert transaction.
///
/// All primary-row inserts execute first, then the queued post-insert
/// actions, inside a single transaction. Any statement failure rolls the
/// whole batch back and fails every ticket with the same error.
pub struct InsertBatch {
    shared: Arc<EngineShared>,
    pending: Vec<PendingRow>,
    post_actions: Vec<PostInsertAction>,
}

impl InsertBatch {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self {
            shared,
            pending: Vec::new(),
            post_actions: Vec::new(),
        }
    }

    /// Queues a pending instance creation.
    ///
    /// The ticket resolves with the populated instance only after `commit`
    /// succeeds.
    pub fn add<T: EntityType>(
        &mut self,
        ids: &[Value],
        fields: &[(&str, Value)],
    ) -> CoreResult<InsertTicket> {
        let descriptor = self.shared.registry.describe::<T>()?;
        self.add_row(descriptor, ids, fields)
    }

    /// Queues a pending creation by descriptor.
    pub fn add_row(
        &mut self,
        descriptor: Arc<TypeDescriptor>,
        ids: &[Value],
        fields: &[(&str, Value)],
    ) -> CoreResult<InsertTicket> {
        // Fail malformed rows at add time, not commit time.
        crate::key::RowKey::new(&descriptor, ids)?;
        let (ticket, state) = InsertTicket::new();
        self.pending.push(PendingRow {
            descriptor,
            ids: ids.to_vec(),
            fields: fields
                .iter()
                .map(|(field, value)| ((*field).to_owned(), value.clone()))
                .collect(),
            ticket: state,
        });
        Ok(ticket)
    }

    /// Queues an action whose statements run inside the same transaction,
    /// after all primary-row inserts (e.g. a join row tying two of the
    /// batch's rows together).
    pub fn add_post_insert_action(
        &mut self,
        action: impl FnOnce() -> CoreResult<Vec<DmlOp>> + Send + 'static,
    ) {
        self.post_actions.push(Box::new(action));
    }

    /// Returns the number of pending rows.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.post_actions.is_empty()
    }

    /// Commits the batch.
    ///
    /// `Sync` blocks until the transaction completes and surfaces its
    /// error; `Async` returns immediately and the outcome is observed
    /// through the tickets.
    pub fn commit(self, mode: CommitMode) -> CoreResult<()> {
        match mode {
            CommitMode::Sync => run_commit(self.shared, self.pending, self.post_actions),
            CommitMode::Async => {
                let shared = Arc::clone(&self.shared);
                let pending = self.pending;
                let post_actions = self.post_actions;
                thread::Builder::new()
                    .name("liverow-batch-commit".to_owned())
                    .spawn(move || {
                        if let Err(e) = run_commit(shared, pending, post_actions) {
                            warn!(error = %e, "async batch commit failed");
                        }
                    })
                    .map_err(|e| CoreError::transaction(e.to_string()))?;
                Ok(())
            }
        }
    }
}

fn run_commit(
    shared: Arc<EngineShared>,
    pending: Vec<PendingRow>,
    post_actions: Vec<PostInsertAction>,
) -> CoreResult<()> {
    let result = build_and_execute(&shared, &pending, post_actions);
    match result {
        Ok(()) => {
            debug!(rows = pending.len(), "batch committed");
            for row in &pending {
                let observed: Vec<(String, Value)> = row
                    .fields
                    .iter()
                    .filter_map(|(field, value)| {
                        row.descriptor
                            .column(field)
                            .map(|column| (column.column.clone(), value.clone()))
                    })
                    .collect();
                let resolution = shared
                    .adopt(&row.descriptor, &row.ids, observed)
                    .map_err(|e| e.to_string());
                let mut slot = row.ticket.slot.lock();
                *slot = Some(resolution);
                row.ticket.ready.notify_all();
            }
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            for row in &pending {
                let mut slot = row.ticket.slot.lock();
                *slot = Some(Err(message.clone()));
                row.ticket.ready.notify_all();
            }
            Err(CoreError::transaction(message))
        }
    }
}

fn build_and_execute(
    shared: &EngineShared,
    pending: &[PendingRow],
    post_actions: Vec<PostInsertAction>,
) -> CoreResult<()> {
    let mut ops = Vec::with_capacity(pending.len() + post_actions.len());
    for row in pending {
        let mut values: Vec<ColumnValue> = row
            .descriptor
            .id_columns
            .iter()
            .zip(row.ids.iter())
            .map(|(id, value)| ColumnValue::new(id.column.clone(), value.clone()))
            .collect();
        for (field, value) in &row.fields {
            let column = row.descriptor.column(field).ok_or_else(|| {
                CoreError::Build(liverow_sql::SqlBuildError::UnknownLinkColumn {
                    table: row.descriptor.qualified_table(),
                    column: field.clone(),
                })
            })?;
            if column.is_local() {
                values.push(ColumnValue::new(column.column.clone(), value.clone()));
            }
        }
        ops.push(insert_row(&row.descriptor, values)?);
    }
    for action in post_actions {
        ops.extend(action()?);
    }
    shared.store.execute_atomic(&ops)?;
    Ok(())
}
