//! Templated statements consumed by the field accessors.
//!
//! Every builder validates link shapes against the descriptors it is given;
//! a malformed link fails here, at build time, not at execution time.

use crate::error::{SqlBuildError, SqlResult};
use crate::ops::{ColumnValue, DmlOp, Eq, Join, SelectColumn, SelectOp};
use liverow_codec::Value;
use liverow_schema::{CollectionDescriptor, CollectionKind, TypeDescriptor};

/// Resolves the value bound to a holder id column.
fn holder_id_value<'a>(
    holder: &TypeDescriptor,
    ids: &'a [Value],
    column: &str,
) -> SqlResult<&'a Value> {
    holder
        .id_columns
        .iter()
        .position(|id| id.column == column)
        .and_then(|i| ids.get(i))
        .ok_or_else(|| SqlBuildError::UnknownLinkColumn {
            table: holder.qualified_table(),
            column: column.to_owned(),
        })
}

fn id_filter(descriptor: &TypeDescriptor, ids: &[Value]) -> SqlResult<Vec<Eq>> {
    if ids.len() != descriptor.id_columns.len() {
        return Err(SqlBuildError::LinkArityMismatch {
            table: descriptor.qualified_table(),
            expected: descriptor.id_columns.len(),
            actual: ids.len(),
        });
    }
    Ok(descriptor
        .id_columns
        .iter()
        .zip(ids.iter())
        .map(|(id, value)| Eq::base(id.column.clone(), value.clone()))
        .collect())
}

/// Builds a point select of the given fields by id.
pub fn select_by_id(
    descriptor: &TypeDescriptor,
    fields: &[&str],
    ids: &[Value],
) -> SqlResult<SelectOp> {
    if fields.is_empty() {
        return Err(SqlBuildError::EmptyColumnList {
            table: descriptor.qualified_table(),
        });
    }
    let mut columns = Vec::with_capacity(fields.len());
    for field in fields {
        let column =
            descriptor
                .column(field)
                .ok_or_else(|| SqlBuildError::UnknownLinkColumn {
                    table: descriptor.qualified_table(),
                    column: (*field).to_owned(),
                })?;
        columns.push(SelectColumn::base(column.column.clone(), column.kind));
    }
    Ok(SelectOp {
        table: descriptor.table.clone(),
        join: None,
        columns,
        filter: id_filter(descriptor, ids)?,
    })
}

/// Builds a select of all id columns by id (existence probe).
pub fn select_ids(descriptor: &TypeDescriptor, ids: &[Value]) -> SqlResult<SelectOp> {
    Ok(SelectOp {
        table: descriptor.table.clone(),
        join: None,
        columns: descriptor
            .id_columns
            .iter()
            .map(|id| SelectColumn::base(id.column.clone(), id.kind))
            .collect(),
        filter: id_filter(descriptor, ids)?,
    })
}

/// Builds an insert of the given column values.
pub fn insert_row(descriptor: &TypeDescriptor, values: Vec<ColumnValue>) -> SqlResult<DmlOp> {
    if values.is_empty() {
        return Err(SqlBuildError::EmptyColumnList {
            table: descriptor.qualified_table(),
        });
    }
    Ok(DmlOp::Insert {
        table: descriptor.table.clone(),
        values,
    })
}

/// Builds a point update of the given column values by id.
pub fn update_columns(
    descriptor: &TypeDescriptor,
    set: Vec<ColumnValue>,
    ids: &[Value],
) -> SqlResult<DmlOp> {
    if set.is_empty() {
        return Err(SqlBuildError::EmptyColumnList {
            table: descriptor.qualified_table(),
        });
    }
    Ok(DmlOp::Update {
        table: descriptor.table.clone(),
        set,
        filter: id_filter(descriptor, ids)?,
    })
}

/// Builds a point delete by id.
pub fn delete_by_id(descriptor: &TypeDescriptor, ids: &[Value]) -> SqlResult<DmlOp> {
    Ok(DmlOp::Delete {
        table: descriptor.table.clone(),
        filter: id_filter(descriptor, ids)?,
        limit_one: false,
    })
}

/// Builds an update nulling the given columns on rows matching the filter.
pub fn set_null_update(
    table: liverow_schema::TableRef,
    columns: &[String],
    filter: Vec<Eq>,
) -> SqlResult<DmlOp> {
    if columns.is_empty() {
        return Err(SqlBuildError::EmptyColumnList {
            table: table.qualified(),
        });
    }
    Ok(DmlOp::Update {
        table,
        set: columns
            .iter()
            .map(|c| ColumnValue::new(c.clone(), Value::Null))
            .collect(),
        filter,
    })
}

/// Builds the membership select backing a collection accessor.
///
/// - One-to-many: selects the child's id columns from the child table.
/// - Many-to-many: selects the member's id columns joined through the join
///   table.
/// - Scalar set: selects the element column from the element table.
///
/// `target` must be supplied for one-to-many and many-to-many collections.
pub fn collection_select(
    holder: &TypeDescriptor,
    collection: &CollectionDescriptor,
    target: Option<&TypeDescriptor>,
    holder_ids: &[Value],
) -> SqlResult<SelectOp> {
    match &collection.kind {
        CollectionKind::OneToMany { child, links } => {
            let target = require_target(target, child.qualified())?;
            let mut filter = Vec::with_capacity(links.len());
            for link in links {
                let value = holder_id_value(holder, holder_ids, &link.remote)?;
                filter.push(Eq::base(link.local.clone(), value.clone()));
            }
            Ok(SelectOp {
                table: child.clone(),
                join: None,
                columns: target
                    .id_columns
                    .iter()
                    .map(|id| SelectColumn::base(id.column.clone(), id.kind))
                    .collect(),
                filter,
            })
        }
        CollectionKind::ManyToMany {
            join,
            target: target_table,
            source_links,
            target_links,
        } => {
            let target = require_target(target, target_table.qualified())?;
            if target_links.len() != target.id_columns.len() {
                return Err(SqlBuildError::LinkArityMismatch {
                    table: target_table.qualified(),
                    expected: target.id_columns.len(),
                    actual: target_links.len(),
                });
            }
            let mut filter = Vec::with_capacity(source_links.len());
            for link in source_links {
                let value = holder_id_value(holder, holder_ids, &link.remote)?;
                filter.push(Eq::join(link.local.clone(), value.clone()));
            }
            Ok(SelectOp {
                table: target_table.clone(),
                join: Some(Join {
                    table: join.clone(),
                    on: target_links
                        .iter()
                        .map(|l| (l.local.clone(), l.remote.clone()))
                        .collect(),
                }),
                columns: target
                    .id_columns
                    .iter()
                    .map(|id| SelectColumn::base(id.column.clone(), id.kind))
                    .collect(),
                filter,
            })
        }
        CollectionKind::ScalarSet {
            table,
            links,
            element_column,
            element_kind,
        } => {
            let mut filter = Vec::with_capacity(links.len());
            for link in links {
                let value = holder_id_value(holder, holder_ids, &link.remote)?;
                filter.push(Eq::base(link.local.clone(), value.clone()));
            }
            Ok(SelectOp {
                table: table.clone(),
                join: None,
                columns: vec![SelectColumn::base(element_column.clone(), *element_kind)],
                filter,
            })
        }
    }
}

/// Builds the join-row values for a many-to-many membership.
fn join_row_values(
    holder: &TypeDescriptor,
    collection: &CollectionDescriptor,
    target: &TypeDescriptor,
    holder_ids: &[Value],
    member_ids: &[Value],
) -> SqlResult<(liverow_schema::TableRef, Vec<ColumnValue>)> {
    let CollectionKind::ManyToMany {
        join,
        source_links,
        target_links,
        ..
    } = &collection.kind
    else {
        return Err(SqlBuildError::UnknownLinkTarget {
            table: collection.backing_table().qualified(),
        });
    };
    let mut values = Vec::with_capacity(source_links.len() + target_links.len());
    for link in source_links {
        let value = holder_id_value(holder, holder_ids, &link.remote)?;
        values.push(ColumnValue::new(link.local.clone(), value.clone()));
    }
    for link in target_links {
        let value = holder_id_value(target, member_ids, &link.remote)?;
        values.push(ColumnValue::new(link.local.clone(), value.clone()));
    }
    Ok((join.clone(), values))
}

/// Builds the upsert adding a many-to-many membership row.
///
/// The whole row is the key: re-adding an existing member is a no-op.
pub fn join_row_upsert(
    holder: &TypeDescriptor,
    collection: &CollectionDescriptor,
    target: &TypeDescriptor,
    holder_ids: &[Value],
    member_ids: &[Value],
) -> SqlResult<DmlOp> {
    let (table, key) = join_row_values(holder, collection, target, holder_ids, member_ids)?;
    Ok(DmlOp::Upsert {
        table,
        key,
        values: Vec::new(),
    })
}

/// Builds the single-row delete removing a many-to-many membership row.
pub fn join_row_delete(
    holder: &TypeDescriptor,
    collection: &CollectionDescriptor,
    target: &TypeDescriptor,
    holder_ids: &[Value],
    member_ids: &[Value],
) -> SqlResult<DmlOp> {
    let (table, key) = join_row_values(holder, collection, target, holder_ids, member_ids)?;
    Ok(DmlOp::Delete {
        table,
        filter: key
            .into_iter()
            .map(|cv| Eq::base(cv.column, cv.value))
            .collect(),
        limit_one: true,
    })
}

fn require_target<'a>(
    target: Option<&'a TypeDescriptor>,
    table: String,
) -> SqlResult<&'a TypeDescriptor> {
    target.ok_or(SqlBuildError::UnknownLinkTarget { table })
}
