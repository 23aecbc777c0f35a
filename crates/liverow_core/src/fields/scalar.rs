//! Scalar value accessor.

use crate::error::{CoreError, CoreResult};
use crate::instance::UniqueInstance;
use liverow_codec::Value;
use liverow_schema::{ColumnDescriptor, TableRef};
use liverow_sql::{select_by_id, update_columns, ColumnValue, DmlOp, Eq, SelectColumn, SelectOp};
use std::sync::Arc;

/// Accessor for one scalar column of one instance.
///
/// `get` reads through to the store; `set` writes through, suppressing
/// no-op writes so update handlers never fire for a value that did not
/// change. Columns declaring an update interval coalesce writes: only the
/// last value within the interval is flushed when it elapses.
pub struct ScalarValue {
    instance: Arc<UniqueInstance>,
    column: ColumnDescriptor,
}

impl ScalarValue {
    pub(crate) fn bind(instance: Arc<UniqueInstance>, field: &str) -> CoreResult<Self> {
        instance.ensure_live()?;
        let column = instance
            .descriptor()
            .column(field)
            .cloned()
            .ok_or_else(|| {
                CoreError::Build(liverow_sql::SqlBuildError::UnknownLinkColumn {
                    table: instance.descriptor().qualified_table(),
                    column: field.to_owned(),
                })
            })?;
        Ok(Self { instance, column })
    }

    /// Returns the column this accessor is bound to.
    pub fn column(&self) -> &ColumnDescriptor {
        &self.column
    }

    /// The table the column actually lives in (its own, or an override).
    fn target_table(&self) -> TableRef {
        let descriptor = self.instance.descriptor();
        TableRef::new(
            self.column
                .schema_override
                .clone()
                .unwrap_or_else(|| descriptor.table.schema.clone()),
            self.column
                .table_override
                .clone()
                .unwrap_or_else(|| descriptor.table.table.clone()),
        )
    }

    fn id_filter(&self) -> Vec<Eq> {
        let descriptor = self.instance.descriptor();
        descriptor
            .id_columns
            .iter()
            .zip(self.instance.ids().iter())
            .map(|(id, value)| Eq::base(id.column.clone(), value.clone()))
            .collect()
    }

    /// Reads the current column value from the store.
    pub fn get(&self) -> CoreResult<Value> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let descriptor = self.instance.descriptor();

        let value = if self.column.is_local() {
            let op = select_by_id(descriptor, &[self.column.field.as_str()], self.instance.ids())?;
            let rows = engine.store.query(&op)?;
            let row = rows.first().ok_or_else(|| {
                CoreError::stale(
                    descriptor.qualified_table(),
                    self.instance.row_key().ids_display(),
                )
            })?;
            row.get(0).clone()
        } else {
            let op = SelectOp {
                table: self.target_table(),
                join: None,
                columns: vec![SelectColumn::base(self.column.column.clone(), self.column.kind)],
                filter: self.id_filter(),
            };
            let rows = engine.store.query(&op)?;
            // An absent foreign row reads as NULL.
            rows.first().map_or(Value::Null, |row| row.get(0).clone())
        };

        self.instance
            .observe([(self.column.column.clone(), value.clone())]);
        Ok(value)
    }

    /// Writes the column, skipping the write when the value is unchanged
    /// from the last known value.
    ///
    /// Returns whether a write was issued (immediately or via the
    /// coalescer). Update handlers fire through the notification path, so a
    /// suppressed no-op write never invokes them.
    pub fn set(&self, value: Value) -> CoreResult<bool> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;

        let last_known = {
            let last_seen = self.instance.last_seen.read();
            last_seen.get(&self.column.column).cloned()
        };
        let last_known = match last_known {
            Some(known) => known,
            None => self.get()?,
        };
        if last_known == value {
            return Ok(false);
        }

        if let Some(interval) = self.column.update_interval {
            engine.coalescer.enqueue(
                &self.instance,
                self.target_table(),
                &self.column,
                value.clone(),
                interval,
            );
        } else {
            self.write_through(&value)?;
        }
        self.instance
            .observe([(self.column.column.clone(), value)]);
        Ok(true)
    }

    fn write_through(&self, value: &Value) -> CoreResult<()> {
        let engine = self.instance.engine()?;
        let descriptor = self.instance.descriptor();
        let op = if self.column.is_local() {
            update_columns(
                descriptor,
                vec![ColumnValue::new(self.column.column.clone(), value.clone())],
                self.instance.ids(),
            )?
        } else {
            DmlOp::Update {
                table: self.target_table(),
                set: vec![ColumnValue::new(self.column.column.clone(), value.clone())],
                filter: self.id_filter(),
            }
        };
        engine.store.execute(&op)?;
        Ok(())
    }
}
