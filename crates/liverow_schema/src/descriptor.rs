//! Parsed, immutable type descriptors.

use crate::error::{SchemaError, SchemaResult};
use crate::spec::{CollectionSpec, FieldSpec, LinkSpec, TypeSpec};
use crate::strategy::{DeleteStrategy, InsertStrategy};
use liverow_codec::{Kind, Value};
use std::time::Duration;

/// A (schema, table) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl TableRef {
    /// Creates a table reference.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Returns the `schema.table` form used in keys and diagnostics.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// A (local column, remote column) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Column on the referring side.
    pub local: String,
    /// Column on the referenced side.
    pub remote: String,
}

impl Link {
    fn from_spec(spec: &LinkSpec) -> Self {
        Self {
            local: spec.local.to_owned(),
            remote: spec.remote.to_owned(),
        }
    }
}

/// An id column with its underlying kind.
#[derive(Debug, Clone)]
pub struct IdColumn {
    /// Column name.
    pub column: String,
    /// Primitive kind.
    pub kind: Kind,
}

/// A scalar column bound to a field.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    /// Field name.
    pub field: String,
    /// Column name.
    pub column: String,
    /// Primitive kind.
    pub kind: Kind,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Default value at insert time.
    pub default: Option<Value>,
    /// Whether a secondary index is declared.
    pub indexed: bool,
    /// Schema override, when the column lives outside the type's table.
    pub schema_override: Option<String>,
    /// Table override, when the column lives outside the type's table.
    pub table_override: Option<String>,
    /// Insert strategy for foreign-column bindings.
    pub insert_strategy: Option<InsertStrategy>,
    /// Update interval for write coalescing.
    pub update_interval: Option<Duration>,
}

impl ColumnDescriptor {
    /// Returns true if the column lives in the type's own table.
    pub fn is_local(&self) -> bool {
        self.schema_override.is_none() && self.table_override.is_none()
    }
}

/// A single-row reference to another table.
#[derive(Debug, Clone)]
pub struct ReferenceDescriptor {
    /// Field name.
    pub field: String,
    /// Referenced table.
    pub target: TableRef,
    /// Ordered link columns (local column, referenced column).
    pub links: Vec<Link>,
    /// Kind of the local link column(s).
    pub link_kind: Kind,
    /// Delete strategy.
    pub delete: DeleteStrategy,
    /// Whether a physical foreign-key constraint is emitted in DDL.
    pub physical_fk: bool,
}

/// The shape of a collection.
#[derive(Debug, Clone)]
pub enum CollectionKind {
    /// Child rows carry link columns pointing at the holder.
    OneToMany {
        /// Child table.
        child: TableRef,
        /// Links from child columns to holder id columns.
        links: Vec<Link>,
    },
    /// Membership rows in a join table.
    ManyToMany {
        /// Join table.
        join: TableRef,
        /// Target table.
        target: TableRef,
        /// Links from join-table columns to holder id columns.
        source_links: Vec<Link>,
        /// Links from join-table columns to member id columns.
        target_links: Vec<Link>,
    },
    /// Scalar elements in a side table.
    ScalarSet {
        /// Element table.
        table: TableRef,
        /// Links from element-table columns to holder id columns.
        links: Vec<Link>,
        /// Column holding the element value.
        element_column: String,
        /// Kind of the element value.
        element_kind: Kind,
    },
}

/// A collection bound to a field.
#[derive(Debug, Clone)]
pub struct CollectionDescriptor {
    /// Field name.
    pub field: String,
    /// Collection shape.
    pub kind: CollectionKind,
    /// Delete strategy applied when the holder is deleted.
    pub delete: DeleteStrategy,
}

impl CollectionDescriptor {
    /// Returns the table the collection's rows live in (child, join, or
    /// element table).
    pub fn backing_table(&self) -> &TableRef {
        match &self.kind {
            CollectionKind::OneToMany { child, .. } => child,
            CollectionKind::ManyToMany { join, .. } => join,
            CollectionKind::ScalarSet { table, .. } => table,
        }
    }

    /// Returns the links binding the backing table to the holder.
    pub fn holder_links(&self) -> &[Link] {
        match &self.kind {
            CollectionKind::OneToMany { links, .. } => links,
            CollectionKind::ManyToMany { source_links, .. } => source_links,
            CollectionKind::ScalarSet { links, .. } => links,
        }
    }
}

/// A cache-tier value bound to a field.
#[derive(Debug, Clone)]
pub struct CacheValueDescriptor {
    /// Field name.
    pub field: String,
    /// Column segment of the cache key.
    pub column: String,
    /// Primitive kind of the cached value.
    pub kind: Kind,
    /// TTL applied on writes.
    pub ttl: Option<Duration>,
    /// Whether a fallback function is expected.
    pub expects_fallback: bool,
}

/// Immutable descriptor for one data type.
///
/// Created once at registration time; never mutated. Field categories keep
/// declaration order, which flows through to DDL generation and handler
/// dispatch.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Stable type name.
    pub type_name: String,
    /// Backing table.
    pub table: TableRef,
    /// Ordered id columns.
    pub id_columns: Vec<IdColumn>,
    /// Scalar columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    /// References in declaration order.
    pub references: Vec<ReferenceDescriptor>,
    /// Collections in declaration order.
    pub collections: Vec<CollectionDescriptor>,
    /// Cache-tier values in declaration order.
    pub cache_values: Vec<CacheValueDescriptor>,
}

impl TypeDescriptor {
    /// Parses and validates a type spec.
    pub fn parse(spec: &TypeSpec) -> SchemaResult<Self> {
        let type_name = spec.type_name.to_owned();
        if spec.schema.is_empty() || spec.table.is_empty() {
            return Err(SchemaError::missing_table(&type_name));
        }
        if spec.id_columns.is_empty() {
            return Err(SchemaError::MissingIdColumn {
                type_name: type_name.clone(),
            });
        }

        let mut id_columns = Vec::with_capacity(spec.id_columns.len());
        for id in &spec.id_columns {
            if id.column.is_empty() {
                return Err(SchemaError::MissingIdColumn {
                    type_name: type_name.clone(),
                });
            }
            id_columns.push(IdColumn {
                column: id.column.to_owned(),
                kind: id.kind,
            });
        }

        let mut descriptor = Self {
            type_name: type_name.clone(),
            table: TableRef::new(spec.schema, spec.table),
            id_columns,
            columns: Vec::new(),
            references: Vec::new(),
            collections: Vec::new(),
            cache_values: Vec::new(),
        };

        for field in &spec.fields {
            descriptor.parse_field(field)?;
        }
        descriptor.validate_links()?;
        Ok(descriptor)
    }

    fn parse_field(&mut self, field: &FieldSpec) -> SchemaResult<()> {
        if field.field.is_empty() {
            return Err(SchemaError::empty_field(&self.type_name));
        }
        let annotations = usize::from(field.reference.is_some())
            + usize::from(field.collection.is_some())
            + usize::from(field.cache.is_some());
        if annotations > 1 {
            return Err(SchemaError::ConflictingAnnotations {
                type_name: self.type_name.clone(),
                field: field.field.to_owned(),
            });
        }

        if let Some(collection) = &field.collection {
            self.collections.push(parse_collection(field.field, collection));
            return Ok(());
        }
        if let Some(cache) = &field.cache {
            self.cache_values.push(CacheValueDescriptor {
                field: field.field.to_owned(),
                column: field.column.to_owned(),
                kind: field.kind,
                ttl: cache.ttl,
                expects_fallback: cache.expects_fallback,
            });
            return Ok(());
        }

        // Scalar and reference entries are table columns and must be named.
        if field.column.is_empty() {
            return Err(SchemaError::empty_column(&self.type_name, field.field));
        }
        if self.column_names().any(|c| c == field.column) {
            return Err(SchemaError::DuplicateColumn {
                type_name: self.type_name.clone(),
                column: field.column.to_owned(),
            });
        }

        if let Some(reference) = &field.reference {
            self.references.push(ReferenceDescriptor {
                field: field.field.to_owned(),
                target: TableRef::new(reference.target_schema, reference.target_table),
                links: reference.links.iter().map(Link::from_spec).collect(),
                link_kind: reference.link_kind,
                delete: reference.delete,
                physical_fk: reference.physical_fk,
            });
        }
        self.columns.push(ColumnDescriptor {
            field: field.field.to_owned(),
            column: field.column.to_owned(),
            kind: field.kind,
            nullable: field.nullable,
            default: field.default.clone(),
            indexed: field.indexed,
            schema_override: field.schema_override.map(str::to_owned),
            table_override: field.table_override.map(str::to_owned),
            insert_strategy: field.insert_strategy,
            update_interval: field.update_interval,
        });
        Ok(())
    }

    /// Cross-checks link columns against declared columns.
    fn validate_links(&self) -> SchemaResult<()> {
        for reference in &self.references {
            if reference.links.is_empty() {
                return Err(SchemaError::bad_link(
                    &self.type_name,
                    &reference.field,
                    "reference declares no link columns",
                ));
            }
            for link in &reference.links {
                if !self.has_column(&link.local) {
                    return Err(SchemaError::UnknownLinkColumn {
                        type_name: self.type_name.clone(),
                        field: reference.field.clone(),
                        column: link.local.clone(),
                    });
                }
            }
        }
        for collection in &self.collections {
            let links = collection.holder_links();
            if links.is_empty() {
                return Err(SchemaError::bad_link(
                    &self.type_name,
                    &collection.field,
                    "collection declares no link columns",
                ));
            }
            // The holder side of every collection link must be an id column.
            for link in links {
                if !self.is_id_column(&link.remote) {
                    return Err(SchemaError::UnknownLinkColumn {
                        type_name: self.type_name.clone(),
                        field: collection.field.clone(),
                        column: link.remote.clone(),
                    });
                }
            }
            if let CollectionKind::ManyToMany {
                join, target_links, ..
            } = &collection.kind
            {
                if join.table.is_empty() {
                    return Err(SchemaError::MissingJoinTable {
                        type_name: self.type_name.clone(),
                        field: collection.field.clone(),
                    });
                }
                if target_links.is_empty() {
                    return Err(SchemaError::bad_link(
                        &self.type_name,
                        &collection.field,
                        "many-to-many collection declares no target links",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Returns `schema.table`.
    pub fn qualified_table(&self) -> String {
        self.table.qualified()
    }

    /// Returns true if `name` is one of the id columns.
    pub fn is_id_column(&self, name: &str) -> bool {
        self.id_columns.iter().any(|id| id.column == name)
    }

    /// Returns true if `name` is a declared column (id or field-backed).
    pub fn has_column(&self, name: &str) -> bool {
        self.is_id_column(name) || self.columns.iter().any(|c| c.column == name)
    }

    /// Looks up a scalar column by field name.
    pub fn column(&self, field: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Looks up a scalar column by column name.
    pub fn column_by_name(&self, column: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.column == column)
    }

    /// Looks up a reference by field name.
    pub fn reference(&self, field: &str) -> Option<&ReferenceDescriptor> {
        self.references.iter().find(|r| r.field == field)
    }

    /// Looks up a collection by field name.
    pub fn collection(&self, field: &str) -> Option<&CollectionDescriptor> {
        self.collections.iter().find(|c| c.field == field)
    }

    /// Looks up a cache value by field name.
    pub fn cache_value(&self, field: &str) -> Option<&CacheValueDescriptor> {
        self.cache_values.iter().find(|c| c.field == field)
    }

    /// Returns the kind of a column (id or field-backed), if declared.
    pub fn column_kind(&self, column: &str) -> Option<Kind> {
        self.id_columns
            .iter()
            .find(|id| id.column == column)
            .map(|id| id.kind)
            .or_else(|| self.column_by_name(column).map(|c| c.kind))
    }

    /// Columns that live in the type's own table, id columns first, then
    /// field-backed columns in declaration order. This is the DDL column
    /// order.
    pub fn local_columns(&self) -> Vec<(&str, Kind, bool)> {
        let mut out: Vec<(&str, Kind, bool)> = self
            .id_columns
            .iter()
            .map(|id| (id.column.as_str(), id.kind, false))
            .collect();
        for column in self.columns.iter().filter(|c| c.is_local()) {
            out.push((column.column.as_str(), column.kind, column.nullable));
        }
        out
    }

    fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.column.as_str())
    }
}

fn parse_collection(field: &str, spec: &CollectionSpec) -> CollectionDescriptor {
    match spec {
        CollectionSpec::OneToMany {
            child_schema,
            child_table,
            links,
            delete,
        } => CollectionDescriptor {
            field: field.to_owned(),
            kind: CollectionKind::OneToMany {
                child: TableRef::new(*child_schema, *child_table),
                links: links.iter().map(Link::from_spec).collect(),
            },
            delete: *delete,
        },
        CollectionSpec::ManyToMany {
            join_schema,
            join_table,
            target_schema,
            target_table,
            source_links,
            target_links,
            delete,
        } => CollectionDescriptor {
            field: field.to_owned(),
            kind: CollectionKind::ManyToMany {
                join: TableRef::new(*join_schema, *join_table),
                target: TableRef::new(*target_schema, *target_table),
                source_links: source_links.iter().map(Link::from_spec).collect(),
                target_links: target_links.iter().map(Link::from_spec).collect(),
            },
            delete: *delete,
        },
        CollectionSpec::ScalarSet {
            table_schema,
            table,
            links,
            element_column,
            element_kind,
            delete,
        } => CollectionDescriptor {
            field: field.to_owned(),
            kind: CollectionKind::ScalarSet {
                table: TableRef::new(*table_schema, *table),
                links: links.iter().map(Link::from_spec).collect(),
                element_column: (*element_column).to_owned(),
                element_kind: *element_kind,
            },
            delete: *delete,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{CacheSpec, ReferenceSpec};

    fn user_spec() -> TypeSpec {
        TypeSpec::new("User", "app", "users")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::column("name", "name", Kind::Text))
            .with_field(FieldSpec::column("age", "age", Kind::Int32).nullable())
    }

    #[test]
    fn parses_scalar_columns() {
        let descriptor = TypeDescriptor::parse(&user_spec()).unwrap();
        assert_eq!(descriptor.qualified_table(), "app.users");
        assert_eq!(descriptor.columns.len(), 2);
        assert_eq!(descriptor.column("name").unwrap().column, "name");
        assert!(descriptor.column("age").unwrap().nullable);
        assert!(descriptor.is_id_column("id"));
    }

    #[test]
    fn missing_id_column_rejected() {
        let spec = TypeSpec::new("Orphan", "app", "orphans");
        assert!(matches!(
            TypeDescriptor::parse(&spec),
            Err(SchemaError::MissingIdColumn { .. })
        ));
    }

    #[test]
    fn unnamed_id_column_rejected() {
        let spec = TypeSpec::new("Orphan", "app", "orphans").with_id("", Kind::Uuid);
        assert!(TypeDescriptor::parse(&spec).is_err());
    }

    #[test]
    fn duplicate_column_rejected() {
        let spec = user_spec().with_field(FieldSpec::column("name2", "name", Kind::Text));
        assert!(matches!(
            TypeDescriptor::parse(&spec),
            Err(SchemaError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn conflicting_annotations_rejected() {
        let mut field = FieldSpec::reference(
            "owner",
            "owner_id",
            ReferenceSpec {
                target_schema: "app",
                target_table: "users",
                links: vec![LinkSpec::new("owner_id", "id")],
                link_kind: Kind::Uuid,
                delete: DeleteStrategy::Cascade,
                physical_fk: true,
            },
        );
        field.cache = Some(CacheSpec::new());
        let spec = user_spec().with_field(field);
        assert!(matches!(
            TypeDescriptor::parse(&spec),
            Err(SchemaError::ConflictingAnnotations { .. })
        ));
    }

    #[test]
    fn reference_link_must_name_declared_column() {
        let spec = user_spec().with_field(FieldSpec::reference(
            "owner",
            "owner_id",
            ReferenceSpec {
                target_schema: "app",
                target_table: "users",
                links: vec![LinkSpec::new("missing_col", "id")],
                link_kind: Kind::Uuid,
                delete: DeleteStrategy::SetNull,
                physical_fk: false,
            },
        ));
        assert!(matches!(
            TypeDescriptor::parse(&spec),
            Err(SchemaError::UnknownLinkColumn { .. })
        ));
    }

    #[test]
    fn collection_holder_link_must_be_id_column() {
        let spec = user_spec().with_field(FieldSpec::collection(
            "posts",
            CollectionSpec::OneToMany {
                child_schema: "app",
                child_table: "posts",
                links: vec![LinkSpec::new("author_id", "name")],
                delete: DeleteStrategy::Cascade,
            },
        ));
        assert!(TypeDescriptor::parse(&spec).is_err());
    }

    #[test]
    fn local_columns_order_is_ids_then_declaration() {
        let descriptor = TypeDescriptor::parse(&user_spec()).unwrap();
        let names: Vec<&str> = descriptor.local_columns().iter().map(|c| c.0).collect();
        assert_eq!(names, vec!["id", "name", "age"]);
    }
}
