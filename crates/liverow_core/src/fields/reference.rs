//! Single-row reference accessor.

use crate::error::{CoreError, CoreResult};
use crate::instance::UniqueInstance;
use liverow_codec::Value;
use liverow_schema::ReferenceDescriptor;
use liverow_sql::{select_by_id, update_columns, ColumnValue, SqlBuildError};
use std::sync::Arc;

/// Accessor for a single-row reference field.
///
/// The local link columns carry the referenced row's id values; a NULL link
/// resolves to `None`.
pub struct Reference {
    instance: Arc<UniqueInstance>,
    reference: ReferenceDescriptor,
}

impl Reference {
    pub(crate) fn bind(instance: Arc<UniqueInstance>, field: &str) -> CoreResult<Self> {
        instance.ensure_live()?;
        let reference = instance
            .descriptor()
            .reference(field)
            .cloned()
            .ok_or_else(|| {
                CoreError::Build(SqlBuildError::UnknownLinkColumn {
                    table: instance.descriptor().qualified_table(),
                    column: field.to_owned(),
                })
            })?;
        Ok(Self {
            instance,
            reference,
        })
    }

    /// Returns the reference descriptor.
    pub fn reference_descriptor(&self) -> &ReferenceDescriptor {
        &self.reference
    }

    /// Resolves the referenced instance, or `None` when a link column is
    /// NULL or the referenced row does not exist.
    pub fn get(&self) -> CoreResult<Option<Arc<UniqueInstance>>> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let descriptor = self.instance.descriptor();

        let target =
            engine
                .registry
                .describe_table(&self.reference.target.schema, &self.reference.target.table)
                .ok_or_else(|| {
                    CoreError::Build(SqlBuildError::UnknownLinkTarget {
                        table: self.reference.target.qualified(),
                    })
                })?;

        // Read the local link column values.
        let fields: Vec<&str> = self
            .reference
            .links
            .iter()
            .map(|link| {
                descriptor
                    .column_by_name(&link.local)
                    .map(|c| c.field.as_str())
                    .ok_or_else(|| {
                        CoreError::Build(SqlBuildError::UnknownLinkColumn {
                            table: descriptor.qualified_table(),
                            column: link.local.clone(),
                        })
                    })
            })
            .collect::<CoreResult<Vec<&str>>>()?;
        let op = select_by_id(descriptor, &fields, self.instance.ids())?;
        let rows = engine.store.query(&op)?;
        let row = rows.first().ok_or_else(|| {
            CoreError::stale(
                descriptor.qualified_table(),
                self.instance.row_key().ids_display(),
            )
        })?;

        let mut link_values: Vec<(&str, Value)> = Vec::with_capacity(self.reference.links.len());
        for (index, link) in self.reference.links.iter().enumerate() {
            let value = row.get(index).clone();
            if value.is_null() {
                return Ok(None);
            }
            link_values.push((link.remote.as_str(), value));
        }

        // Order the target's id values per its descriptor.
        let mut target_ids = Vec::with_capacity(target.id_columns.len());
        for id in &target.id_columns {
            let value = link_values
                .iter()
                .find(|(remote, _)| *remote == id.column)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| {
                    CoreError::Build(SqlBuildError::UnknownLinkColumn {
                        table: target.qualified_table(),
                        column: id.column.clone(),
                    })
                })?;
            target_ids.push(value);
        }

        engine.resolve(&target, &target_ids)
    }

    /// Writes the local link columns from the target's id values, or nulls
    /// them for `None`.
    pub fn set(&self, target: Option<&Arc<UniqueInstance>>) -> CoreResult<()> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let descriptor = self.instance.descriptor();

        let mut set = Vec::with_capacity(self.reference.links.len());
        for link in &self.reference.links {
            let value = match target {
                None => Value::Null,
                Some(target) => {
                    target.ensure_live()?;
                    let target_descriptor = target.descriptor();
                    let position = target_descriptor
                        .id_columns
                        .iter()
                        .position(|id| id.column == link.remote)
                        .ok_or_else(|| {
                            CoreError::Build(SqlBuildError::UnknownLinkColumn {
                                table: target_descriptor.qualified_table(),
                                column: link.remote.clone(),
                            })
                        })?;
                    target.ids()[position].clone()
                }
            };
            set.push(ColumnValue::new(link.local.clone(), value));
        }

        let observed: Vec<(String, Value)> = set
            .iter()
            .map(|cv| (cv.column.clone(), cv.value.clone()))
            .collect();
        let op = update_columns(descriptor, set, self.instance.ids())?;
        engine.store.execute(&op)?;
        self.instance.observe(observed);
        Ok(())
    }
}
