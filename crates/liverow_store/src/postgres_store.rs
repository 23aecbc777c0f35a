//! Production Postgres store.

use crate::backend::{ChangeSubscription, RelationalStore, Row};
use crate::error::{StoreError, StoreResult};
use fallible_iterator::FallibleIterator;
use liverow_codec::{Kind, Value};
use liverow_schema::TableRef;
use liverow_sql::{
    render_ddl, render_dml, render_select, render_trigger, DdlOp, Dialect, DmlOp, SelectOp,
    TriggerDef, NOTIFY_CHANNEL,
};
use parking_lot::Mutex;
use postgres::types::ToSql;
use postgres::{Client, Config, NoTls};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, warn};

/// Store backed by a Postgres database.
///
/// Ops are rendered at [`Dialect::Postgres`] and executed over a pooled-style
/// shared client. The change-feed subscription owns its own dedicated
/// connection, since LISTEN requires a stateful, non-pooled connection.
pub struct PostgresStore {
    client: Mutex<Client>,
    config: Config,
}

impl PostgresStore {
    /// Connects to the given connection string
    /// (e.g. `host=localhost user=app dbname=app`).
    pub fn connect(params: &str) -> StoreResult<Self> {
        let config: Config = params
            .parse()
            .map_err(|e: postgres::Error| StoreError::connection(e.to_string()))?;
        let client = config
            .connect(NoTls)
            .map_err(|e| StoreError::connection(e.to_string()))?;
        Ok(Self {
            client: Mutex::new(client),
            config,
        })
    }

    fn bind(values: &[Value]) -> Vec<Box<dyn ToSql + Sync>> {
        values
            .iter()
            .map(|value| -> Box<dyn ToSql + Sync> {
                match value {
                    Value::Null => Box::new(Option::<String>::None),
                    Value::Bool(v) => Box::new(*v),
                    Value::Int16(v) => Box::new(*v),
                    Value::Int32(v) => Box::new(*v),
                    Value::Int64(v) => Box::new(*v),
                    Value::Float32(v) => Box::new(*v),
                    Value::Float64(v) => Box::new(*v),
                    Value::Text(v) => Box::new(v.clone()),
                    Value::Bytes(v) => Box::new(v.clone()),
                    Value::Uuid(v) => Box::new(*v),
                    Value::Timestamp(v) => Box::new(*v),
                }
            })
            .collect()
    }

    fn decode_column(row: &postgres::Row, index: usize, kind: Kind) -> StoreResult<Value> {
        let value = match kind {
            Kind::Bool => row.try_get::<_, Option<bool>>(index)?.map(Value::Bool),
            Kind::Int16 => row.try_get::<_, Option<i16>>(index)?.map(Value::Int16),
            Kind::Int32 => row.try_get::<_, Option<i32>>(index)?.map(Value::Int32),
            Kind::Int64 => row.try_get::<_, Option<i64>>(index)?.map(Value::Int64),
            Kind::Float32 => row.try_get::<_, Option<f32>>(index)?.map(Value::Float32),
            Kind::Float64 => row.try_get::<_, Option<f64>>(index)?.map(Value::Float64),
            Kind::Text => row.try_get::<_, Option<String>>(index)?.map(Value::Text),
            Kind::Bytes => row.try_get::<_, Option<Vec<u8>>>(index)?.map(Value::Bytes),
            Kind::Uuid => row.try_get::<_, Option<uuid::Uuid>>(index)?.map(Value::Uuid),
            Kind::Timestamp => row
                .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(index)?
                .map(Value::Timestamp),
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

impl RelationalStore for PostgresStore {
    fn query(&self, op: &SelectOp) -> StoreResult<Vec<Row>> {
        let (sql, values) = render_select(op, Dialect::Postgres);
        let boxed = Self::bind(&values);
        let params: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(AsRef::as_ref).collect();

        let mut client = self.client.lock();
        let rows = client.query(sql.as_str(), &params)?;
        rows.iter()
            .map(|row| {
                let values = op
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| Self::decode_column(row, index, column.kind))
                    .collect::<StoreResult<Vec<Value>>>()?;
                Ok(Row::new(values))
            })
            .collect()
    }

    fn execute(&self, op: &DmlOp) -> StoreResult<u64> {
        let (sql, values) = render_dml(op, Dialect::Postgres);
        let boxed = Self::bind(&values);
        let params: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(AsRef::as_ref).collect();
        let mut client = self.client.lock();
        Ok(client.execute(sql.as_str(), &params)?)
    }

    fn execute_atomic(&self, ops: &[DmlOp]) -> StoreResult<()> {
        let mut client = self.client.lock();
        let mut txn = client
            .transaction()
            .map_err(|e| StoreError::transaction(e.to_string()))?;
        for op in ops {
            let (sql, values) = render_dml(op, Dialect::Postgres);
            let boxed = Self::bind(&values);
            let params: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(AsRef::as_ref).collect();
            // Dropping the transaction on error rolls the whole batch back.
            txn.execute(sql.as_str(), &params)
                .map_err(|e| StoreError::transaction(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| StoreError::transaction(e.to_string()))
    }

    fn apply_ddl(&self, op: &DdlOp) -> StoreResult<()> {
        let sql = render_ddl(op, Dialect::Postgres);
        debug!(sql, "applying ddl");
        let mut client = self.client.lock();
        Ok(client.batch_execute(&sql)?)
    }

    fn install_trigger(&self, def: &TriggerDef) -> StoreResult<()> {
        let sql = render_trigger(def).postgres;
        debug!(name = %def.name, "installing trigger");
        let mut client = self.client.lock();
        Ok(client.batch_execute(&sql)?)
    }

    fn drop_trigger(&self, name: &str, table: &TableRef) -> StoreResult<()> {
        let d = Dialect::Postgres;
        let sql = format!(
            "DROP TRIGGER IF EXISTS {} ON {}",
            d.quote(name),
            d.quote_table(&table.schema, &table.table)
        );
        let mut client = self.client.lock();
        Ok(client.batch_execute(&sql)?)
    }

    fn subscribe(&self) -> StoreResult<ChangeSubscription> {
        // LISTEN needs its own long-lived connection; notifications arrive
        // on the connection that issued the LISTEN.
        let mut client = self
            .config
            .clone()
            .connect(NoTls)
            .map_err(|e| StoreError::connection(e.to_string()))?;
        client.batch_execute(&format!("LISTEN {NOTIFY_CHANNEL}"))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("liverow-pg-listen".to_owned())
            .spawn(move || {
                let mut notifications = client.notifications();
                let mut iter = notifications.blocking_iter();
                loop {
                    match iter.next() {
                        Ok(Some(notification)) => {
                            if notification.channel() != NOTIFY_CHANNEL {
                                continue;
                            }
                            if tx.send(notification.payload().to_owned()).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "change-feed connection lost");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| StoreError::connection(e.to_string()))?;
        Ok(ChangeSubscription::new(rx))
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
