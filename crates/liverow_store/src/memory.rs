//! Embedded in-memory store.

use crate::backend::{ChangeSubscription, RelationalStore, Row};
use crate::change::{ChangeOp, ChangePayload};
use crate::error::{StoreError, StoreResult};
use liverow_codec::Value;
use liverow_schema::TableRef;
use liverow_sql::{
    Alias, ColumnDef, DdlOp, DmlOp, Eq, SelectOp, TriggerAction, TriggerDef,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{self, Sender};

/// Cascade chains longer than this indicate a trigger cycle.
const MAX_TRIGGER_DEPTH: usize = 16;

type RowData = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    rows: Vec<RowData>,
}

#[derive(Debug, Clone, Default)]
struct State {
    schemas: BTreeSet<String>,
    tables: BTreeMap<String, Table>,
    triggers: BTreeMap<String, TriggerDef>,
}

/// The embedded store, used for local and test execution.
///
/// Interprets the constrained op AST over in-memory tables, enforces NOT
/// NULL and primary-key constraints, enacts installed delete-strategy
/// triggers, and publishes change-feed payloads after commit for tables
/// carrying a notify trigger.
pub struct MemoryStore {
    state: RwLock<State>,
    subscribers: RwLock<Vec<Sender<String>>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            subscribers: RwLock::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    /// Makes the next `execute`/`execute_atomic` call fail with the given
    /// message. Test hook for rollback and reconnect scenarios.
    pub fn fail_next_statement(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// Drops all change-feed subscriptions, simulating connection loss.
    /// Subscribers observe a disconnected receiver and re-subscribe.
    pub fn drop_subscriptions(&self) {
        self.subscribers.write().clear();
    }

    /// Returns the number of rows currently in a table.
    pub fn row_count(&self, table: &TableRef) -> usize {
        self.state
            .read()
            .tables
            .get(&table.qualified())
            .map_or(0, |t| t.rows.len())
    }

    fn take_injected_failure(&self) -> Option<String> {
        self.fail_next.lock().take()
    }

    fn emit(&self, payloads: Vec<ChangePayload>) {
        if payloads.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.write();
        for payload in payloads {
            let wire = payload.to_wire();
            subscribers.retain(|tx| tx.send(wire.clone()).is_ok());
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationalStore for MemoryStore {
    fn query(&self, op: &SelectOp) -> StoreResult<Vec<Row>> {
        let state = self.state.read();
        run_query(&state, op)
    }

    fn execute(&self, op: &DmlOp) -> StoreResult<u64> {
        if let Some(message) = self.take_injected_failure() {
            return Err(StoreError::statement(message));
        }
        let mut state = self.state.write();
        let mut payloads = Vec::new();
        let affected = apply_dml(&mut state, op, &mut payloads)?;
        drop(state);
        self.emit(payloads);
        Ok(affected)
    }

    fn execute_atomic(&self, ops: &[DmlOp]) -> StoreResult<()> {
        if let Some(message) = self.take_injected_failure() {
            return Err(StoreError::transaction(message));
        }
        let mut state = self.state.write();
        // Work on a copy; swap in only if every op succeeds.
        let mut draft = state.clone();
        let mut payloads = Vec::new();
        for op in ops {
            apply_dml(&mut draft, op, &mut payloads)
                .map_err(|e| StoreError::transaction(e.to_string()))?;
        }
        *state = draft;
        drop(state);
        self.emit(payloads);
        Ok(())
    }

    fn apply_ddl(&self, op: &DdlOp) -> StoreResult<()> {
        let mut state = self.state.write();
        match op {
            DdlOp::CreateSchema { schema } => {
                state.schemas.insert(schema.clone());
            }
            DdlOp::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                state.schemas.insert(table.schema.clone());
                state
                    .tables
                    .entry(table.qualified())
                    .or_insert_with(|| Table {
                        columns: columns.clone(),
                        primary_key: primary_key.clone(),
                        rows: Vec::new(),
                    });
            }
            DdlOp::CreateIndex { .. } => {}
            DdlOp::AddForeignKey { target, .. } => {
                if !state.tables.contains_key(&target.qualified()) {
                    return Err(StoreError::UnknownTable {
                        table: target.qualified(),
                    });
                }
            }
        }
        Ok(())
    }

    fn install_trigger(&self, def: &TriggerDef) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.tables.contains_key(&def.table.qualified()) {
            return Err(StoreError::UnknownTable {
                table: def.table.qualified(),
            });
        }
        state.triggers.insert(def.name.clone(), def.clone());
        Ok(())
    }

    fn drop_trigger(&self, name: &str, _table: &TableRef) -> StoreResult<()> {
        self.state.write().triggers.remove(name);
        Ok(())
    }

    fn subscribe(&self) -> StoreResult<ChangeSubscription> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        Ok(ChangeSubscription::new(rx))
    }
}

fn table<'a>(state: &'a State, table: &TableRef) -> StoreResult<&'a Table> {
    state
        .tables
        .get(&table.qualified())
        .ok_or_else(|| StoreError::UnknownTable {
            table: table.qualified(),
        })
}

fn matches(row: &RowData, filter: &[Eq], alias: Alias) -> bool {
    filter
        .iter()
        .filter(|eq| eq.alias == alias)
        .all(|eq| row.get(&eq.column).unwrap_or(&Value::Null) == &eq.value)
}

fn run_query(state: &State, op: &SelectOp) -> StoreResult<Vec<Row>> {
    let base = table(state, &op.table)?;
    let mut out = Vec::new();

    let project = |base_row: &RowData, join_row: Option<&RowData>| -> Row {
        let values = op
            .columns
            .iter()
            .map(|column| {
                let row = match column.alias {
                    Alias::Base => Some(base_row),
                    Alias::Join => join_row,
                };
                row.and_then(|r| r.get(&column.column))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        Row::new(values)
    };

    match &op.join {
        None => {
            for row in base.rows.iter().filter(|r| matches(r, &op.filter, Alias::Base)) {
                out.push(project(row, None));
            }
        }
        Some(join) => {
            let joined = table(state, &join.table)?;
            for base_row in base.rows.iter().filter(|r| matches(r, &op.filter, Alias::Base)) {
                for join_row in joined.rows.iter() {
                    let on_match = join.on.iter().all(|(join_column, base_column)| {
                        join_row.get(join_column).unwrap_or(&Value::Null)
                            == base_row.get(base_column).unwrap_or(&Value::Null)
                    });
                    if on_match && matches(join_row, &op.filter, Alias::Join) {
                        out.push(project(base_row, Some(join_row)));
                    }
                }
            }
        }
    }
    Ok(out)
}

fn notify_installed(state: &State, qualified: &str) -> bool {
    state.triggers.values().any(|t| {
        matches!(t.action, TriggerAction::Notify) && t.table.qualified() == qualified
    })
}

fn payload_for(state: &State, table: &TableRef, op: ChangeOp, old: Option<&RowData>, new: Option<&RowData>) -> Option<ChangePayload> {
    if !notify_installed(state, &table.qualified()) {
        return None;
    }
    let encode = |row: Option<&RowData>| {
        row.map(|r| ChangePayload::encode_columns(r.iter()))
            .unwrap_or_default()
    };
    Some(ChangePayload {
        schema: table.schema.clone(),
        table: table.table.clone(),
        op,
        old: encode(old),
        new: encode(new),
    })
}

fn check_row(table_def: &Table, table_name: &str, row: &RowData) -> StoreResult<()> {
    for column in &table_def.columns {
        if !column.nullable {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            if value.is_null() {
                return Err(StoreError::constraint(
                    table_name,
                    format!("column {} is NOT NULL", column.name),
                ));
            }
        }
    }
    Ok(())
}

fn pk_values(table_def: &Table, row: &RowData) -> Vec<Value> {
    table_def
        .primary_key
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

fn insert_row(
    state: &mut State,
    table_ref: &TableRef,
    values: &[liverow_sql::ColumnValue],
    payloads: &mut Vec<ChangePayload>,
) -> StoreResult<u64> {
    let qualified = table_ref.qualified();
    let table_def = table(state, table_ref)?.clone();

    let mut row = RowData::new();
    for column in &table_def.columns {
        if let Some(default) = &column.default {
            row.insert(column.name.clone(), default.clone());
        }
    }
    for cv in values {
        if !table_def.columns.iter().any(|c| c.name == cv.column) {
            return Err(StoreError::statement(format!(
                "unknown column {} on {qualified}",
                cv.column
            )));
        }
        row.insert(cv.column.clone(), cv.value.clone());
    }
    check_row(&table_def, &qualified, &row)?;

    let pk = pk_values(&table_def, &row);
    if !table_def.primary_key.is_empty() {
        let exists = table(state, table_ref)?
            .rows
            .iter()
            .any(|r| pk_values(&table_def, r) == pk);
        if exists {
            return Err(StoreError::constraint(qualified, "duplicate primary key"));
        }
    }

    if let Some(payload) = payload_for(state, table_ref, ChangeOp::Insert, None, Some(&row)) {
        payloads.push(payload);
    }
    state
        .tables
        .get_mut(&qualified)
        .ok_or_else(|| StoreError::UnknownTable {
            table: qualified.clone(),
        })?
        .rows
        .push(row);
    Ok(1)
}

fn update_rows(
    state: &mut State,
    table_ref: &TableRef,
    set: &[liverow_sql::ColumnValue],
    filter: &[Eq],
    payloads: &mut Vec<ChangePayload>,
) -> StoreResult<u64> {
    let qualified = table_ref.qualified();
    let table_def = table(state, table_ref)?.clone();

    let mut updated = Vec::new();
    {
        let rows = &mut state
            .tables
            .get_mut(&qualified)
            .ok_or_else(|| StoreError::UnknownTable {
                table: qualified.clone(),
            })?
            .rows;
        for row in rows.iter_mut().filter(|r| matches(r, filter, Alias::Base)) {
            let old = row.clone();
            for cv in set {
                row.insert(cv.column.clone(), cv.value.clone());
            }
            check_row(&table_def, &qualified, row)?;
            updated.push((old, row.clone()));
        }
    }
    let count = updated.len() as u64;
    for (old, new) in updated {
        if let Some(payload) =
            payload_for(state, table_ref, ChangeOp::Update, Some(&old), Some(&new))
        {
            payloads.push(payload);
        }
    }
    Ok(count)
}

fn delete_rows(
    state: &mut State,
    table_ref: &TableRef,
    filter: &[Eq],
    limit_one: bool,
    payloads: &mut Vec<ChangePayload>,
    depth: usize,
) -> StoreResult<u64> {
    let pred = |row: &RowData| matches(row, filter, Alias::Base);
    delete_where(state, table_ref, &pred, limit_one, payloads, depth)
}

fn delete_where(
    state: &mut State,
    table_ref: &TableRef,
    pred: &dyn Fn(&RowData) -> bool,
    limit_one: bool,
    payloads: &mut Vec<ChangePayload>,
    depth: usize,
) -> StoreResult<u64> {
    if depth > MAX_TRIGGER_DEPTH {
        return Err(StoreError::statement("trigger cascade too deep"));
    }
    let qualified = table_ref.qualified();
    let mut removed = Vec::new();
    {
        let rows = &mut state
            .tables
            .get_mut(&qualified)
            .ok_or_else(|| StoreError::UnknownTable {
                table: qualified.clone(),
            })?
            .rows;
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows.drain(..) {
            if pred(&row) && !(limit_one && !removed.is_empty()) {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        *rows = kept;
    }

    // The deleted rows' payloads come first; dependent-row effects follow,
    // matching trigger execution after the parent delete.
    for row in &removed {
        if let Some(payload) = payload_for(state, table_ref, ChangeOp::Delete, Some(row), None) {
            payloads.push(payload);
        }
    }

    let triggers: Vec<TriggerDef> = state
        .triggers
        .values()
        .filter(|t| t.table.qualified() == qualified)
        .filter(|t| !matches!(t.action, TriggerAction::Notify))
        .cloned()
        .collect();

    for row in &removed {
        for trigger in &triggers {
            fire_trigger(state, trigger, row, payloads, depth + 1)?;
        }
    }
    Ok(removed.len() as u64)
}

fn fire_trigger(
    state: &mut State,
    trigger: &TriggerDef,
    old_row: &RowData,
    payloads: &mut Vec<ChangePayload>,
    depth: usize,
) -> StoreResult<()> {
    match &trigger.action {
        TriggerAction::DeleteRows { table, links } => {
            let expected: Vec<(String, Value)> = links
                .iter()
                .map(|l| {
                    (
                        l.column.clone(),
                        old_row.get(&l.parent_column).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();
            let pred = move |row: &RowData| {
                expected
                    .iter()
                    .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
            };
            delete_where(state, table, &pred, false, payloads, depth)?;
        }
        TriggerAction::SetNullColumns { table, links } => {
            let filter: Vec<Eq> = links
                .iter()
                .map(|l| {
                    Eq::base(
                        l.column.clone(),
                        old_row.get(&l.parent_column).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();
            let set: Vec<liverow_sql::ColumnValue> = links
                .iter()
                .map(|l| liverow_sql::ColumnValue::new(l.column.clone(), Value::Null))
                .collect();
            update_rows(state, table, &set, &filter, payloads)?;
        }
        TriggerAction::DeleteJoinAndMembers {
            join,
            join_links,
            member,
            member_links,
        } => {
            let join_qualified = join.qualified();
            let join_rows: Vec<RowData> = state
                .tables
                .get(&join_qualified)
                .ok_or_else(|| StoreError::UnknownTable {
                    table: join_qualified.clone(),
                })?
                .rows
                .iter()
                .filter(|row| {
                    join_links.iter().all(|l| {
                        row.get(&l.column).unwrap_or(&Value::Null)
                            == old_row.get(&l.parent_column).unwrap_or(&Value::Null)
                    })
                })
                .cloned()
                .collect();

            for join_row in &join_rows {
                let expected: Vec<(String, Value)> = member_links
                    .iter()
                    .map(|(join_column, member_column)| {
                        (
                            member_column.clone(),
                            join_row.get(join_column).cloned().unwrap_or(Value::Null),
                        )
                    })
                    .collect();
                let pred = move |row: &RowData| {
                    expected
                        .iter()
                        .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
                };
                delete_where(state, member, &pred, false, payloads, depth)?;
            }

            let old = old_row.clone();
            let join_links = join_links.clone();
            let pred = move |row: &RowData| {
                join_links.iter().all(|l| {
                    row.get(&l.column).unwrap_or(&Value::Null)
                        == old.get(&l.parent_column).unwrap_or(&Value::Null)
                })
            };
            delete_where(state, join, &pred, false, payloads, depth)?;
        }
        TriggerAction::Notify => {}
    }
    Ok(())
}

fn upsert_row(
    state: &mut State,
    table_ref: &TableRef,
    key: &[liverow_sql::ColumnValue],
    values: &[liverow_sql::ColumnValue],
    payloads: &mut Vec<ChangePayload>,
) -> StoreResult<u64> {
    let exists = table(state, table_ref)?.rows.iter().any(|row| {
        key.iter()
            .all(|cv| row.get(&cv.column).unwrap_or(&Value::Null) == &cv.value)
    });
    if exists {
        return Ok(0);
    }
    let all: Vec<liverow_sql::ColumnValue> = key.iter().chain(values.iter()).cloned().collect();
    insert_row(state, table_ref, &all, payloads)
}

fn apply_dml(
    state: &mut State,
    op: &DmlOp,
    payloads: &mut Vec<ChangePayload>,
) -> StoreResult<u64> {
    match op {
        DmlOp::Insert { table, values } => insert_row(state, table, values, payloads),
        DmlOp::Update { table, set, filter } => update_rows(state, table, set, filter, payloads),
        DmlOp::Delete {
            table,
            filter,
            limit_one,
        } => delete_rows(state, table, filter, *limit_one, payloads, 0),
        DmlOp::Upsert { table, key, values } => upsert_row(state, table, key, values, payloads),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liverow_sql::{ColumnValue, SelectColumn};
    use liverow_codec::Kind;

    fn users() -> TableRef {
        TableRef::new("app", "users")
    }

    fn store_with_users() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .apply_ddl(&DdlOp::CreateTable {
                table: users(),
                columns: vec![
                    ColumnDef {
                        name: "id".to_owned(),
                        kind: Kind::Int64,
                        nullable: false,
                        default: None,
                    },
                    ColumnDef {
                        name: "name".to_owned(),
                        kind: Kind::Text,
                        nullable: false,
                        default: None,
                    },
                    ColumnDef {
                        name: "age".to_owned(),
                        kind: Kind::Int32,
                        nullable: true,
                        default: None,
                    },
                ],
                primary_key: vec!["id".to_owned()],
            })
            .unwrap();
        store
    }

    fn insert_user(store: &MemoryStore, id: i64, name: &str) {
        store
            .execute(&DmlOp::Insert {
                table: users(),
                values: vec![
                    ColumnValue::new("id", Value::Int64(id)),
                    ColumnValue::new("name", Value::text(name)),
                ],
            })
            .unwrap();
    }

    fn select_names(filter: Vec<Eq>) -> SelectOp {
        SelectOp {
            table: users(),
            join: None,
            columns: vec![SelectColumn::base("name", Kind::Text)],
            filter,
        }
    }

    #[test]
    fn insert_and_query() {
        let store = store_with_users();
        insert_user(&store, 1, "alice");
        let rows = store
            .query(&select_names(vec![Eq::base("id", Value::Int64(1))]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), &Value::text("alice"));
    }

    #[test]
    fn not_null_enforced() {
        let store = store_with_users();
        let result = store.execute(&DmlOp::Insert {
            table: users(),
            values: vec![ColumnValue::new("id", Value::Int64(1))],
        });
        assert!(matches!(result, Err(StoreError::Constraint { .. })));
    }

    #[test]
    fn duplicate_pk_rejected() {
        let store = store_with_users();
        insert_user(&store, 1, "alice");
        let result = store.execute(&DmlOp::Insert {
            table: users(),
            values: vec![
                ColumnValue::new("id", Value::Int64(1)),
                ColumnValue::new("name", Value::text("bob")),
            ],
        });
        assert!(matches!(result, Err(StoreError::Constraint { .. })));
    }

    #[test]
    fn atomic_batch_rolls_back_on_failure() {
        let store = store_with_users();
        insert_user(&store, 1, "alice");

        let result = store.execute_atomic(&[
            DmlOp::Insert {
                table: users(),
                values: vec![
                    ColumnValue::new("id", Value::Int64(2)),
                    ColumnValue::new("name", Value::text("bob")),
                ],
            },
            // Duplicate primary key; the whole batch must roll back.
            DmlOp::Insert {
                table: users(),
                values: vec![
                    ColumnValue::new("id", Value::Int64(1)),
                    ColumnValue::new("name", Value::text("mallory")),
                ],
            },
        ]);
        assert!(matches!(result, Err(StoreError::Transaction { .. })));
        assert_eq!(store.row_count(&users()), 1);
    }

    #[test]
    fn payloads_emitted_only_with_notify_trigger() {
        let store = store_with_users();
        let subscription = store.subscribe().unwrap();
        insert_user(&store, 1, "alice");
        assert!(subscription.receiver().try_recv().is_err());

        store
            .install_trigger(&TriggerDef {
                name: "lr_notify_users".to_owned(),
                table: users(),
                action: TriggerAction::Notify,
            })
            .unwrap();
        insert_user(&store, 2, "bob");
        let wire = subscription.receiver().recv().unwrap();
        let payload = ChangePayload::from_wire(&wire).unwrap();
        assert_eq!(payload.op, ChangeOp::Insert);
        assert_eq!(payload.new.get("name").map(String::as_str), Some("bob"));
    }

    #[test]
    fn update_payload_carries_old_and_new() {
        let store = store_with_users();
        store
            .install_trigger(&TriggerDef {
                name: "lr_notify_users".to_owned(),
                table: users(),
                action: TriggerAction::Notify,
            })
            .unwrap();
        let subscription = store.subscribe().unwrap();
        insert_user(&store, 1, "alice");
        subscription.receiver().recv().unwrap();

        store
            .execute(&DmlOp::Update {
                table: users(),
                set: vec![ColumnValue::new("name", Value::text("alicia"))],
                filter: vec![Eq::base("id", Value::Int64(1))],
            })
            .unwrap();
        let payload =
            ChangePayload::from_wire(&subscription.receiver().recv().unwrap()).unwrap();
        assert_eq!(payload.op, ChangeOp::Update);
        assert_eq!(payload.old.get("name").map(String::as_str), Some("alice"));
        assert_eq!(payload.new.get("name").map(String::as_str), Some("alicia"));
    }

    #[test]
    fn cascade_trigger_deletes_dependents() {
        let store = store_with_users();
        let posts = TableRef::new("app", "posts");
        store
            .apply_ddl(&DdlOp::CreateTable {
                table: posts.clone(),
                columns: vec![
                    ColumnDef {
                        name: "id".to_owned(),
                        kind: Kind::Int64,
                        nullable: false,
                        default: None,
                    },
                    ColumnDef {
                        name: "author_id".to_owned(),
                        kind: Kind::Int64,
                        nullable: true,
                        default: None,
                    },
                ],
                primary_key: vec!["id".to_owned()],
            })
            .unwrap();
        store
            .install_trigger(&TriggerDef {
                name: "lr_del_users_posts".to_owned(),
                table: users(),
                action: TriggerAction::DeleteRows {
                    table: posts.clone(),
                    links: vec![liverow_sql::TriggerLink {
                        column: "author_id".to_owned(),
                        parent_column: "id".to_owned(),
                    }],
                },
            })
            .unwrap();

        insert_user(&store, 1, "alice");
        store
            .execute(&DmlOp::Insert {
                table: posts.clone(),
                values: vec![
                    ColumnValue::new("id", Value::Int64(10)),
                    ColumnValue::new("author_id", Value::Int64(1)),
                ],
            })
            .unwrap();

        store
            .execute(&DmlOp::Delete {
                table: users(),
                filter: vec![Eq::base("id", Value::Int64(1))],
                limit_one: false,
            })
            .unwrap();
        assert_eq!(store.row_count(&posts), 0);
    }

    #[test]
    fn set_null_trigger_nulls_links() {
        let store = store_with_users();
        let profiles = TableRef::new("app", "profiles");
        store
            .apply_ddl(&DdlOp::CreateTable {
                table: profiles.clone(),
                columns: vec![
                    ColumnDef {
                        name: "id".to_owned(),
                        kind: Kind::Int64,
                        nullable: false,
                        default: None,
                    },
                    ColumnDef {
                        name: "user_id".to_owned(),
                        kind: Kind::Int64,
                        nullable: true,
                        default: None,
                    },
                ],
                primary_key: vec!["id".to_owned()],
            })
            .unwrap();
        store
            .install_trigger(&TriggerDef {
                name: "lr_del_profiles_user".to_owned(),
                table: users(),
                action: TriggerAction::SetNullColumns {
                    table: profiles.clone(),
                    links: vec![liverow_sql::TriggerLink {
                        column: "user_id".to_owned(),
                        parent_column: "id".to_owned(),
                    }],
                },
            })
            .unwrap();

        insert_user(&store, 1, "alice");
        store
            .execute(&DmlOp::Insert {
                table: profiles.clone(),
                values: vec![
                    ColumnValue::new("id", Value::Int64(20)),
                    ColumnValue::new("user_id", Value::Int64(1)),
                ],
            })
            .unwrap();
        store
            .execute(&DmlOp::Delete {
                table: users(),
                filter: vec![Eq::base("id", Value::Int64(1))],
                limit_one: false,
            })
            .unwrap();

        assert_eq!(store.row_count(&profiles), 1);
        let rows = store
            .query(&SelectOp {
                table: profiles,
                join: None,
                columns: vec![SelectColumn::base("user_id", Kind::Int64)],
                filter: vec![Eq::base("id", Value::Int64(20))],
            })
            .unwrap();
        assert_eq!(rows[0].get(0), &Value::Null);
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = store_with_users();
        let op = DmlOp::Upsert {
            table: users(),
            key: vec![
                ColumnValue::new("id", Value::Int64(1)),
                ColumnValue::new("name", Value::text("alice")),
            ],
            values: vec![],
        };
        assert_eq!(store.execute(&op).unwrap(), 1);
        assert_eq!(store.execute(&op).unwrap(), 0);
        assert_eq!(store.row_count(&users()), 1);
    }

    #[test]
    fn delete_limit_one_removes_single_row() {
        let store = store_with_users();
        insert_user(&store, 1, "dup");
        insert_user(&store, 2, "dup");
        let affected = store
            .execute(&DmlOp::Delete {
                table: users(),
                filter: vec![Eq::base("name", Value::text("dup"))],
                limit_one: true,
            })
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(store.row_count(&users()), 1);
    }

    #[test]
    fn injected_failure_fails_once() {
        let store = store_with_users();
        store.fail_next_statement("boom");
        assert!(store
            .execute(&DmlOp::Delete {
                table: users(),
                filter: vec![],
                limit_one: false,
            })
            .is_err());
        insert_user(&store, 1, "alice");
    }
}
