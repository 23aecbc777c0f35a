//! Schema sync and the local delete path.

use crate::engine::EngineShared;
use crate::error::{CoreError, CoreResult};
use crate::instance::UniqueInstance;
use crate::key::RowKey;
use liverow_codec::Value;
use liverow_schema::{TableRef, TypeDescriptor};
use liverow_sql::{
    delete_by_id, schema_ops, schema_triggers, select_by_id, set_null_update, DmlOp, Eq,
    SelectColumn, SelectOp, TriggerAction, TriggerDef, TriggerLink,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Applies DDL and installs triggers for every registered type.
///
/// Trigger names are canonical per relation, so re-declaring a relation
/// with a different strategy replaces the old trigger; the name is dropped
/// on both candidate tables first, since a strategy change can move the
/// trigger between the declaring and the referenced table. Failures here
/// are fatal at schema-sync time, never at runtime.
pub(crate) fn sync_schema(shared: &EngineShared) -> CoreResult<()> {
    let descriptors = shared.registry.descriptors();
    for op in schema_ops(&descriptors)? {
        shared.store.apply_ddl(&op)?;
    }
    for descriptor in &descriptors {
        for reference in &descriptor.references {
            let name = liverow_sql::trigger_name(&descriptor.table, &reference.field);
            shared.store.drop_trigger(&name, &descriptor.table)?;
            shared.store.drop_trigger(&name, &reference.target)?;
        }
    }
    for trigger in schema_triggers(&descriptors)? {
        shared.store.install_trigger(&trigger)?;
        debug!(name = %trigger.name, table = %trigger.table.qualified(), "installed trigger");
    }
    Ok(())
}

/// Deletes an instance's row, enacting delete strategies synchronously.
///
/// The dependent-row ops mirror the installed triggers exactly; when the
/// store-side triggers also fire (they do for the embedded store), the
/// mirrored ops match zero remaining rows, so both paths stay semantically
/// identical.
pub(crate) fn local_delete(
    shared: &Arc<EngineShared>,
    instance: &Arc<UniqueInstance>,
) -> CoreResult<()> {
    instance.ensure_live()?;
    let descriptor = instance.descriptor();

    let row = read_row(shared, descriptor, instance.ids())?;
    let mut ops = vec![delete_by_id(descriptor, instance.ids())?];
    let mut cascaded: Vec<(TableRef, Vec<(String, Value)>)> = Vec::new();

    for trigger in triggers_on(shared, &descriptor.table)? {
        build_trigger_ops(shared, &trigger, &row, &mut ops, &mut cascaded)?;
    }

    shared.store.execute_atomic(&ops)?;

    shared.identity.mark_deleted(instance.row_key());
    // Mark live instances torn down by cascade so their accessors fail
    // fast before the notification arrives.
    for (table, links) in cascaded {
        if let Some(target) = shared.registry.describe_table(&table.schema, &table.table) {
            if let Some(key) = cascade_key(&target, &links) {
                shared.identity.mark_deleted(&key);
            }
        }
    }
    Ok(())
}

fn read_row(
    shared: &EngineShared,
    descriptor: &Arc<TypeDescriptor>,
    ids: &[Value],
) -> CoreResult<HashMap<String, Value>> {
    let mut row: HashMap<String, Value> = descriptor
        .id_columns
        .iter()
        .zip(ids.iter())
        .map(|(id, value)| (id.column.clone(), value.clone()))
        .collect();

    let fields: Vec<&str> = descriptor
        .columns
        .iter()
        .filter(|c| c.is_local())
        .map(|c| c.field.as_str())
        .collect();
    if !fields.is_empty() {
        let op = select_by_id(descriptor, &fields, ids)?;
        let rows = shared.store.query(&op)?;
        let Some(result) = rows.first() else {
            return Err(CoreError::stale(
                descriptor.qualified_table(),
                "row is gone",
            ));
        };
        for (index, field) in fields.iter().enumerate() {
            if let Some(column) = descriptor.column(field) {
                row.insert(column.column.clone(), result.get(index).clone());
            }
        }
    }
    Ok(row)
}

/// Collects every installed-trigger definition that fires on a table's
/// DELETE, across all registered types.
fn triggers_on(shared: &EngineShared, table: &TableRef) -> CoreResult<Vec<TriggerDef>> {
    let descriptors = shared.registry.descriptors();
    let mut triggers = Vec::new();
    for def in schema_triggers(&descriptors)? {
        if def.table == *table && !matches!(def.action, TriggerAction::Notify) {
            triggers.push(def);
        }
    }
    Ok(triggers)
}

fn link_values(links: &[TriggerLink], row: &HashMap<String, Value>) -> Vec<(String, Value)> {
    links
        .iter()
        .map(|link| {
            (
                link.column.clone(),
                row.get(&link.parent_column).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

fn build_trigger_ops(
    shared: &EngineShared,
    trigger: &TriggerDef,
    row: &HashMap<String, Value>,
    ops: &mut Vec<DmlOp>,
    cascaded: &mut Vec<(TableRef, Vec<(String, Value)>)>,
) -> CoreResult<()> {
    match &trigger.action {
        TriggerAction::DeleteRows { table, links } => {
            let values = link_values(links, row);
            ops.push(DmlOp::Delete {
                table: table.clone(),
                filter: values
                    .iter()
                    .map(|(column, value)| Eq::base(column.clone(), value.clone()))
                    .collect(),
                limit_one: false,
            });
            cascaded.push((table.clone(), values));
        }
        TriggerAction::SetNullColumns { table, links } => {
            let columns: Vec<String> = links.iter().map(|link| link.column.clone()).collect();
            let filter = link_values(links, row)
                .into_iter()
                .map(|(column, value)| Eq::base(column, value))
                .collect();
            ops.push(set_null_update(table.clone(), &columns, filter)?);
        }
        TriggerAction::DeleteJoinAndMembers {
            join,
            join_links,
            member,
            member_links,
        } => {
            // The member rows must be looked up before the join rows go.
            let join_filter: Vec<Eq> = link_values(join_links, row)
                .into_iter()
                .map(|(column, value)| Eq::base(column, value))
                .collect();
            let target = shared.registry.describe_table(&member.schema, &member.table);
            let join_columns: Vec<SelectColumn> = member_links
                .iter()
                .filter_map(|(join_column, member_column)| {
                    let kind = target.as_ref()?.column_kind(member_column)?;
                    Some(SelectColumn::base(join_column.clone(), kind))
                })
                .collect();
            // Member deletion needs a registered target to type the join
            // columns; otherwise only the join rows go.
            if join_columns.len() == member_links.len() {
                let select = SelectOp {
                    table: join.clone(),
                    join: None,
                    columns: join_columns,
                    filter: join_filter.clone(),
                };
                for join_row in shared.store.query(&select)? {
                    let values: Vec<(String, Value)> = member_links
                        .iter()
                        .enumerate()
                        .map(|(index, (_, member_column))| {
                            (member_column.clone(), join_row.get(index).clone())
                        })
                        .collect();
                    ops.push(DmlOp::Delete {
                        table: member.clone(),
                        filter: values
                            .iter()
                            .map(|(column, value)| Eq::base(column.clone(), value.clone()))
                            .collect(),
                        limit_one: false,
                    });
                    cascaded.push((member.clone(), values));
                }
            }
            ops.push(DmlOp::Delete {
                table: join.clone(),
                filter: join_filter,
                limit_one: false,
            });
        }
        TriggerAction::Notify => {}
    }
    Ok(())
}

/// Builds the row key of a cascaded row when the link values cover the
/// target's id columns.
fn cascade_key(target: &Arc<TypeDescriptor>, links: &[(String, Value)]) -> Option<RowKey> {
    let mut ids = Vec::with_capacity(target.id_columns.len());
    for id in &target.id_columns {
        let value = links
            .iter()
            .find(|(column, _)| *column == id.column)
            .map(|(_, value)| value.clone())?;
        ids.push(value);
    }
    RowKey::new(target, &ids).ok()
}
