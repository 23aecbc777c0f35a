//! DDL generation from descriptors, and the stable schema dump.

use crate::dialect::{Dialect, StatementPair};
use crate::error::{SqlBuildError, SqlResult};
use crate::ops::{ColumnDef, DdlOp, FkAction};
use crate::render::render_ddl;
use crate::trigger::{
    backing_notify_trigger, delete_triggers, notify_trigger, render_trigger, TriggerDef,
};
use liverow_schema::{CollectionKind, DeleteStrategy, TableRef, TypeDescriptor};
use std::collections::HashSet;
use std::sync::Arc;

/// Builds the CREATE TABLE and CREATE INDEX ops for a type's own table.
pub fn table_ddl(descriptor: &TypeDescriptor) -> Vec<DdlOp> {
    let mut ops = Vec::new();
    let columns = descriptor
        .id_columns
        .iter()
        .map(|id| ColumnDef {
            name: id.column.clone(),
            kind: id.kind,
            nullable: false,
            default: None,
        })
        .chain(
            descriptor
                .columns
                .iter()
                .filter(|c| c.is_local())
                .map(|c| ColumnDef {
                    name: c.column.clone(),
                    kind: c.kind,
                    nullable: c.nullable,
                    default: c.default.clone(),
                }),
        )
        .collect();
    ops.push(DdlOp::CreateTable {
        table: descriptor.table.clone(),
        columns,
        primary_key: descriptor
            .id_columns
            .iter()
            .map(|id| id.column.clone())
            .collect(),
    });
    for column in descriptor.columns.iter().filter(|c| c.indexed && c.is_local()) {
        ops.push(DdlOp::CreateIndex {
            name: format!("idx_{}_{}", descriptor.table.table, column.column),
            table: descriptor.table.clone(),
            columns: vec![column.column.clone()],
        });
    }
    ops
}

/// Looks up a descriptor by (schema, table) within a schema set.
fn find<'a>(
    descriptors: &'a [Arc<TypeDescriptor>],
    table: &TableRef,
) -> SqlResult<&'a TypeDescriptor> {
    descriptors
        .iter()
        .map(Arc::as_ref)
        .find(|d| d.table == *table)
        .ok_or_else(|| SqlBuildError::UnknownLinkTarget {
            table: table.qualified(),
        })
}

/// Builds the CREATE TABLE ops for a type's collection backing tables
/// (join tables and scalar-element tables; one-to-many children are
/// registered types with their own DDL).
fn backing_table_ddl(
    descriptor: &TypeDescriptor,
    descriptors: &[Arc<TypeDescriptor>],
) -> SqlResult<Vec<DdlOp>> {
    let mut ops = Vec::new();
    for collection in &descriptor.collections {
        match &collection.kind {
            CollectionKind::OneToMany { child, links } => {
                // The child table must be registered and carry the link
                // columns.
                let child_descriptor = find(descriptors, child)?;
                for link in links {
                    if !child_descriptor.has_column(&link.local) {
                        return Err(SqlBuildError::UnknownLinkColumn {
                            table: child.qualified(),
                            column: link.local.clone(),
                        });
                    }
                }
            }
            CollectionKind::ManyToMany {
                join,
                target,
                source_links,
                target_links,
            } => {
                let target_descriptor = find(descriptors, target)?;
                if target_links.len() != target_descriptor.id_columns.len() {
                    return Err(SqlBuildError::LinkArityMismatch {
                        table: target.qualified(),
                        expected: target_descriptor.id_columns.len(),
                        actual: target_links.len(),
                    });
                }
                let mut columns = Vec::new();
                let mut primary_key = Vec::new();
                for link in source_links {
                    let kind = descriptor.column_kind(&link.remote).ok_or_else(|| {
                        SqlBuildError::UnknownLinkColumn {
                            table: descriptor.qualified_table(),
                            column: link.remote.clone(),
                        }
                    })?;
                    columns.push(ColumnDef {
                        name: link.local.clone(),
                        kind,
                        nullable: false,
                        default: None,
                    });
                    primary_key.push(link.local.clone());
                }
                for link in target_links {
                    let kind = target_descriptor.column_kind(&link.remote).ok_or_else(|| {
                        SqlBuildError::UnknownLinkColumn {
                            table: target.qualified(),
                            column: link.remote.clone(),
                        }
                    })?;
                    columns.push(ColumnDef {
                        name: link.local.clone(),
                        kind,
                        nullable: false,
                        default: None,
                    });
                    primary_key.push(link.local.clone());
                }
                ops.push(DdlOp::CreateTable {
                    table: join.clone(),
                    columns,
                    primary_key,
                });
            }
            CollectionKind::ScalarSet {
                table,
                links,
                element_column,
                element_kind,
            } => {
                let mut columns = Vec::new();
                let mut primary_key = Vec::new();
                for link in links {
                    let kind = descriptor.column_kind(&link.remote).ok_or_else(|| {
                        SqlBuildError::UnknownLinkColumn {
                            table: descriptor.qualified_table(),
                            column: link.remote.clone(),
                        }
                    })?;
                    columns.push(ColumnDef {
                        name: link.local.clone(),
                        kind,
                        nullable: false,
                        default: None,
                    });
                    primary_key.push(link.local.clone());
                }
                columns.push(ColumnDef {
                    name: element_column.clone(),
                    kind: *element_kind,
                    nullable: false,
                    default: None,
                });
                primary_key.push(element_column.clone());
                ops.push(DdlOp::CreateTable {
                    table: table.clone(),
                    columns,
                    primary_key,
                });
            }
        }
    }
    Ok(ops)
}

/// Builds the foreign-key constraint ops for a type's physical references.
///
/// The declared delete strategies run the engine's direction (referring row
/// deletion affecting the referenced row), which physical FKs cannot
/// express; the constraint's ON DELETE only carries `SET NULL`, the one
/// strategy that matches FK direction.
fn foreign_key_ddl(
    descriptor: &TypeDescriptor,
    descriptors: &[Arc<TypeDescriptor>],
) -> SqlResult<Vec<DdlOp>> {
    let mut ops = Vec::new();
    for reference in descriptor.references.iter().filter(|r| r.physical_fk) {
        let target = find(descriptors, &reference.target)?;
        for link in &reference.links {
            if !target.has_column(&link.remote) {
                return Err(SqlBuildError::UnknownLinkColumn {
                    table: reference.target.qualified(),
                    column: link.remote.clone(),
                });
            }
        }
        let on_delete = match reference.delete {
            DeleteStrategy::SetNull => FkAction::SetNull,
            _ => FkAction::NoAction,
        };
        ops.push(DdlOp::AddForeignKey {
            name: format!("fk_{}_{}", descriptor.table.table, reference.field),
            table: descriptor.table.clone(),
            columns: reference.links.iter().map(|l| l.local.clone()).collect(),
            target: reference.target.clone(),
            target_columns: reference.links.iter().map(|l| l.remote.clone()).collect(),
            on_delete,
            on_update: FkAction::NoAction,
        });
    }
    Ok(ops)
}

/// Builds the structured DDL ops for a set of descriptors: schemas, then
/// tables, then indexes, then constraints; within each category, descriptor
/// declaration order. Duplicate schemas and backing tables (a self-join
/// table declared from both ends) appear once.
pub fn schema_ops(descriptors: &[Arc<TypeDescriptor>]) -> SqlResult<Vec<DdlOp>> {
    let mut schemas: Vec<String> = Vec::new();
    let mut tables: Vec<DdlOp> = Vec::new();
    let mut indexes: Vec<DdlOp> = Vec::new();
    let mut constraints: Vec<DdlOp> = Vec::new();
    let mut seen_tables: HashSet<String> = HashSet::new();

    for descriptor in descriptors {
        if !schemas.contains(&descriptor.table.schema) {
            schemas.push(descriptor.table.schema.clone());
        }
        for op in table_ddl(descriptor) {
            match &op {
                DdlOp::CreateTable { table, .. } => {
                    if seen_tables.insert(table.qualified()) {
                        tables.push(op);
                    }
                }
                DdlOp::CreateIndex { .. } => indexes.push(op),
                _ => {}
            }
        }
        for op in backing_table_ddl(descriptor, descriptors)? {
            if let DdlOp::CreateTable { table, .. } = &op {
                if !schemas.contains(&table.schema) {
                    schemas.push(table.schema.clone());
                }
                if seen_tables.insert(table.qualified()) {
                    tables.push(op);
                }
            }
        }
        constraints.extend(foreign_key_ddl(descriptor, descriptors)?);
    }

    let mut ops = Vec::new();
    for schema in schemas {
        ops.push(DdlOp::CreateSchema { schema });
    }
    ops.extend(tables);
    ops.extend(indexes);
    ops.extend(constraints);
    Ok(ops)
}

/// Builds every trigger for a set of descriptors: delete-strategy triggers
/// first, then notify triggers, deduplicated by name.
pub fn schema_triggers(descriptors: &[Arc<TypeDescriptor>]) -> SqlResult<Vec<TriggerDef>> {
    let mut triggers = Vec::new();
    let mut seen_triggers: HashSet<String> = HashSet::new();

    for descriptor in descriptors {
        for trigger in delete_triggers(descriptor)? {
            if seen_triggers.insert(trigger.name.clone()) {
                triggers.push(trigger);
            }
        }
        let notify = notify_trigger(descriptor);
        if seen_triggers.insert(notify.name.clone()) {
            triggers.push(notify);
        }
        for collection in &descriptor.collections {
            let backing = collection.backing_table();
            // One-to-many children are registered types with their own
            // notify trigger.
            if matches!(collection.kind, CollectionKind::OneToMany { .. }) {
                continue;
            }
            let notify = backing_notify_trigger(backing);
            if seen_triggers.insert(notify.name.clone()) {
                triggers.push(notify);
            }
        }
    }

    Ok(triggers)
}

/// Builds the full schema dump for a set of descriptors, rendered in both
/// dialects.
///
/// Ordering is stable for testability: schemas, tables, indexes,
/// constraints, then triggers; within each category, descriptor declaration
/// order.
pub fn schema_statements(descriptors: &[Arc<TypeDescriptor>]) -> SqlResult<Vec<StatementPair>> {
    let mut statements: Vec<StatementPair> =
        schema_ops(descriptors)?.iter().map(pair).collect();
    for trigger in schema_triggers(descriptors)? {
        statements.push(render_trigger(&trigger));
    }
    Ok(statements)
}

fn pair(op: &DdlOp) -> StatementPair {
    StatementPair {
        embedded: render_ddl(op, Dialect::Embedded),
        postgres: render_ddl(op, Dialect::Postgres),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liverow_codec::Kind;
    use liverow_schema::{
        CollectionSpec, FieldSpec, LinkSpec, ReferenceSpec, TypeSpec,
    };

    fn descriptors() -> Vec<Arc<TypeDescriptor>> {
        let user = TypeSpec::new("User", "app", "users")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::column("name", "name", Kind::Text).indexed())
            .with_field(FieldSpec::collection(
                "friends",
                CollectionSpec::ManyToMany {
                    join_schema: "app",
                    join_table: "user_friends",
                    target_schema: "app",
                    target_table: "users",
                    source_links: vec![LinkSpec::new("source_id", "id")],
                    target_links: vec![LinkSpec::new("target_id", "id")],
                    delete: DeleteStrategy::Unlink,
                },
            ));
        let post = TypeSpec::new("Post", "app", "posts")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::reference(
                "author",
                "author_id",
                ReferenceSpec {
                    target_schema: "app",
                    target_table: "users",
                    links: vec![LinkSpec::new("author_id", "id")],
                    link_kind: Kind::Uuid,
                    delete: DeleteStrategy::SetNull,
                    physical_fk: true,
                },
            ));
        vec![
            Arc::new(TypeDescriptor::parse(&user).unwrap()),
            Arc::new(TypeDescriptor::parse(&post).unwrap()),
        ]
    }

    #[test]
    fn dump_order_is_schemas_tables_indexes_constraints_triggers() {
        let statements = schema_statements(&descriptors()).unwrap();
        let postgres: Vec<&str> = statements.iter().map(|s| s.postgres.as_str()).collect();

        let first_schema = postgres.iter().position(|s| s.starts_with("CREATE SCHEMA")).unwrap();
        let last_table = postgres
            .iter()
            .rposition(|s| s.starts_with("CREATE TABLE"))
            .unwrap();
        let index = postgres.iter().position(|s| s.starts_with("CREATE INDEX")).unwrap();
        let constraint = postgres.iter().position(|s| s.starts_with("ALTER TABLE")).unwrap();
        let first_trigger = postgres
            .iter()
            .position(|s| s.contains("CREATE OR REPLACE FUNCTION"))
            .unwrap();

        assert!(first_schema < last_table);
        assert!(last_table < index);
        assert!(index < constraint);
        assert!(constraint < first_trigger);
    }

    #[test]
    fn dump_is_deterministic() {
        let a = schema_statements(&descriptors()).unwrap();
        let b = schema_statements(&descriptors()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn join_table_emitted_once_with_composite_key() {
        let statements = schema_statements(&descriptors()).unwrap();
        let join_tables: Vec<&StatementPair> = statements
            .iter()
            .filter(|s| s.postgres.contains("\"user_friends\""))
            .filter(|s| s.postgres.starts_with("CREATE TABLE"))
            .collect();
        assert_eq!(join_tables.len(), 1);
        assert!(join_tables[0]
            .postgres
            .contains("PRIMARY KEY (\"source_id\", \"target_id\")"));
    }

    #[test]
    fn physical_fk_gets_set_null_action() {
        let statements = schema_statements(&descriptors()).unwrap();
        let fk = statements
            .iter()
            .find(|s| s.postgres.starts_with("ALTER TABLE"))
            .unwrap();
        assert!(fk.postgres.contains("ON DELETE SET NULL"));
        assert!(fk.postgres.contains("ON UPDATE NO ACTION"));
    }

    #[test]
    fn unknown_link_target_fails_at_build_time() {
        let orphan = TypeSpec::new("Orphan", "app", "orphans")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::reference(
                "ghost",
                "ghost_id",
                ReferenceSpec {
                    target_schema: "app",
                    target_table: "missing",
                    links: vec![LinkSpec::new("ghost_id", "id")],
                    link_kind: Kind::Uuid,
                    delete: DeleteStrategy::NoAction,
                    physical_fk: true,
                },
            ));
        let descriptors = vec![Arc::new(TypeDescriptor::parse(&orphan).unwrap())];
        assert!(matches!(
            schema_statements(&descriptors),
            Err(SqlBuildError::UnknownLinkTarget { .. })
        ));
    }
}
