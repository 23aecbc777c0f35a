//! The structural contract supplied by the code-generation step.
//!
//! The engine never performs runtime reflection. An external tool (or a
//! hand-written impl) supplies one [`TypeSpec`] per data type; the registry
//! parses it once into an immutable [`crate::TypeDescriptor`].

use crate::strategy::{DeleteStrategy, InsertStrategy};
use liverow_codec::{Kind, Value};
use std::time::Duration;

/// Declarative metadata for one data type, as produced by codegen.
///
/// Field entries are ordered; declaration order is preserved through to DDL
/// generation and handler dispatch.
#[derive(Debug, Clone)]
pub struct TypeSpec {
    /// Stable name of the data type (used in errors and diagnostics).
    pub type_name: &'static str,
    /// Schema the backing table lives in.
    pub schema: &'static str,
    /// Backing table name.
    pub table: &'static str,
    /// Ordered id columns.
    pub id_columns: Vec<IdColumnSpec>,
    /// Ordered field entries.
    pub fields: Vec<FieldSpec>,
}

impl TypeSpec {
    /// Creates a spec with no fields.
    pub fn new(type_name: &'static str, schema: &'static str, table: &'static str) -> Self {
        Self {
            type_name,
            schema,
            table,
            id_columns: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Adds an id column.
    pub fn with_id(mut self, column: &'static str, kind: Kind) -> Self {
        self.id_columns.push(IdColumnSpec { column, kind });
        self
    }

    /// Adds a field entry.
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

/// An id column declaration.
#[derive(Debug, Clone)]
pub struct IdColumnSpec {
    /// Column name.
    pub column: &'static str,
    /// Underlying primitive kind.
    pub kind: Kind,
}

/// One declarative field entry.
///
/// A field is a scalar column unless it carries a reference, collection, or
/// cache annotation. Annotations are mutually exclusive; the registry
/// rejects entries claiming more than one.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name as exposed to accessors.
    pub field: &'static str,
    /// Backing column name (empty for collection fields, which have no local
    /// column).
    pub column: &'static str,
    /// Primitive kind of the backing column.
    pub kind: Kind,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Default value applied at insert time when none is supplied.
    pub default: Option<Value>,
    /// Whether a secondary index is declared on the column.
    pub indexed: bool,
    /// Optional schema override (column lives in a different schema).
    pub schema_override: Option<&'static str>,
    /// Optional table override (column lives in a different table).
    pub table_override: Option<&'static str>,
    /// Parent-reference annotation.
    pub reference: Option<ReferenceSpec>,
    /// Collection annotation.
    pub collection: Option<CollectionSpec>,
    /// Cache-tier annotation.
    pub cache: Option<CacheSpec>,
    /// Insert strategy for foreign-column-bound scalars.
    pub insert_strategy: Option<InsertStrategy>,
    /// Scalar update interval: writes within the interval are coalesced.
    pub update_interval: Option<Duration>,
}

impl FieldSpec {
    /// Creates a plain scalar column entry.
    pub fn column(field: &'static str, column: &'static str, kind: Kind) -> Self {
        Self {
            field,
            column,
            kind,
            nullable: false,
            default: None,
            indexed: false,
            schema_override: None,
            table_override: None,
            reference: None,
            collection: None,
            cache: None,
            insert_strategy: None,
            update_interval: None,
        }
    }

    /// Creates a reference entry backed by the given link columns.
    pub fn reference(field: &'static str, column: &'static str, spec: ReferenceSpec) -> Self {
        let kind = spec.link_kind;
        let mut entry = Self::column(field, column, kind);
        entry.nullable = true;
        entry.reference = Some(spec);
        entry
    }

    /// Creates a collection entry (no local column).
    pub fn collection(field: &'static str, spec: CollectionSpec) -> Self {
        let mut entry = Self::column(field, "", Kind::Int64);
        entry.collection = Some(spec);
        entry
    }

    /// Creates a cache-tier value entry.
    pub fn cache(field: &'static str, kind: Kind, spec: CacheSpec) -> Self {
        let mut entry = Self::column(field, field, kind);
        entry.cache = Some(spec);
        entry
    }

    /// Marks the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Declares a default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Declares a secondary index.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Declares an insert strategy.
    pub fn with_insert_strategy(mut self, strategy: InsertStrategy) -> Self {
        self.insert_strategy = Some(strategy);
        self
    }

    /// Declares an update interval for write coalescing.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }
}

/// A (local column, remote column) pair joining a referring row to a
/// referenced row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    /// Column on the referring side.
    pub local: &'static str,
    /// Column on the referenced side.
    pub remote: &'static str,
}

impl LinkSpec {
    /// Creates a link.
    pub fn new(local: &'static str, remote: &'static str) -> Self {
        Self { local, remote }
    }
}

/// A parent-reference annotation.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    /// Schema of the referenced table.
    pub target_schema: &'static str,
    /// Referenced table.
    pub target_table: &'static str,
    /// Ordered link columns.
    pub links: Vec<LinkSpec>,
    /// Kind of the local link column(s).
    pub link_kind: Kind,
    /// Delete strategy for the reference.
    pub delete: DeleteStrategy,
    /// Whether a physical foreign-key constraint is declared in DDL.
    pub physical_fk: bool,
}

/// A collection annotation.
#[derive(Debug, Clone)]
pub enum CollectionSpec {
    /// One-to-many: child rows carry link columns pointing at the holder.
    OneToMany {
        /// Schema of the child table.
        child_schema: &'static str,
        /// Child table.
        child_table: &'static str,
        /// Links from child columns to holder id columns.
        links: Vec<LinkSpec>,
        /// Delete strategy applied when the holder is deleted.
        delete: DeleteStrategy,
    },
    /// Many-to-many through a join table.
    ManyToMany {
        /// Schema of the join table.
        join_schema: &'static str,
        /// Join table name.
        join_table: &'static str,
        /// Schema of the target table.
        target_schema: &'static str,
        /// Target table.
        target_table: &'static str,
        /// Links from join-table source columns to holder id columns.
        source_links: Vec<LinkSpec>,
        /// Links from join-table target columns to member id columns.
        target_links: Vec<LinkSpec>,
        /// Delete strategy applied when the holder is deleted.
        delete: DeleteStrategy,
    },
    /// One-to-many of scalars: element rows in a side table.
    ScalarSet {
        /// Schema of the element table.
        table_schema: &'static str,
        /// Element table.
        table: &'static str,
        /// Links from element-table columns to holder id columns.
        links: Vec<LinkSpec>,
        /// Column holding the element value.
        element_column: &'static str,
        /// Kind of the element value.
        element_kind: Kind,
        /// Delete strategy applied when the holder is deleted.
        delete: DeleteStrategy,
    },
}

/// A cache-tier annotation.
#[derive(Debug, Clone)]
pub struct CacheSpec {
    /// Time-to-live applied on writes; `None` means no expiry.
    pub ttl: Option<Duration>,
    /// Whether a fallback function is expected at accessor construction.
    pub expects_fallback: bool,
}

impl CacheSpec {
    /// Creates a cache annotation with no TTL.
    pub fn new() -> Self {
        Self {
            ttl: None,
            expects_fallback: true,
        }
    }

    /// Sets the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Declares that no fallback function will be supplied.
    pub fn without_fallback(mut self) -> Self {
        self.expects_fallback = false;
        self
    }
}

impl Default for CacheSpec {
    fn default() -> Self {
        Self::new()
    }
}
