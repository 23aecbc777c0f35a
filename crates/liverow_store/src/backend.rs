//! Relational store trait definition.

use crate::error::StoreResult;
use liverow_codec::Value;
use liverow_schema::TableRef;
use liverow_sql::{DdlOp, DmlOp, SelectOp, TriggerDef};
use std::sync::mpsc::Receiver;

/// One result row, with values aligned to the select's column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Values in select-column order.
    pub values: Vec<Value>,
}

impl Row {
    /// Creates a row.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the value at a column position.
    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Null)
    }
}

/// A live change-feed subscription.
///
/// The receiver yields raw payload text in commit order per row. When the
/// underlying connection is lost the sender side drops and `recv` starts
/// failing, which is the subscriber's signal to re-subscribe.
pub struct ChangeSubscription {
    receiver: Receiver<String>,
}

impl ChangeSubscription {
    /// Wraps a payload receiver.
    pub fn new(receiver: Receiver<String>) -> Self {
        Self { receiver }
    }

    /// Returns the payload receiver.
    pub fn receiver(&self) -> &Receiver<String> {
        &self.receiver
    }
}

/// A relational store executing the constrained op AST.
///
/// The embedded store interprets ops directly; the Postgres store renders
/// them to SQL text. Both deliver identical semantics:
///
/// # Invariants
///
/// - `execute_atomic` is all-or-nothing: a failing op rolls back every op
///   in the batch
/// - installed triggers enact their action on the same transaction as the
///   statement that fired them
/// - change-feed payloads are published only after commit, in commit order
///   for any single row
/// - `install_trigger` replaces any existing trigger with the same name
pub trait RelationalStore: Send + Sync {
    /// Runs a query and returns its rows.
    fn query(&self, op: &SelectOp) -> StoreResult<Vec<Row>>;

    /// Executes a single mutation and returns the affected row count.
    fn execute(&self, op: &DmlOp) -> StoreResult<u64>;

    /// Executes several mutations in one all-or-nothing transaction.
    fn execute_atomic(&self, ops: &[DmlOp]) -> StoreResult<()>;

    /// Applies a DDL statement.
    fn apply_ddl(&self, op: &DdlOp) -> StoreResult<()>;

    /// Installs a trigger, replacing any existing trigger of the same name.
    fn install_trigger(&self, def: &TriggerDef) -> StoreResult<()>;

    /// Drops a trigger by name, ignoring unknown names.
    fn drop_trigger(&self, name: &str, table: &TableRef) -> StoreResult<()>;

    /// Opens a change-feed subscription.
    fn subscribe(&self) -> StoreResult<ChangeSubscription>;
}
