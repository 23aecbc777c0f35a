//! The constrained statement AST.
//!
//! Ops carry table references, column names, and parameter values in
//! structured form. The embedded store interprets them directly; the
//! Postgres store renders them to text via [`crate::render`].

use liverow_codec::{Kind, Value};
use liverow_schema::TableRef;

/// A (column, value) pair for writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    /// Column name.
    pub column: String,
    /// Value to write.
    pub value: Value,
}

impl ColumnValue {
    /// Creates a column/value pair.
    pub fn new(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// An equality predicate on a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Eq {
    /// Side of the join the column lives on.
    pub alias: Alias,
    /// Column name.
    pub column: String,
    /// Value to match. `Null` matches SQL NULL (rendered as `IS NULL`).
    pub value: Value,
}

impl Eq {
    /// Creates a predicate on the base table.
    pub fn base(column: impl Into<String>, value: Value) -> Self {
        Self {
            alias: Alias::Base,
            column: column.into(),
            value,
        }
    }

    /// Creates a predicate on the joined table.
    pub fn join(column: impl Into<String>, value: Value) -> Self {
        Self {
            alias: Alias::Join,
            column: column.into(),
            value,
        }
    }
}

/// Table alias within a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alias {
    /// The base (selected-from) table, aliased `t`.
    Base,
    /// The joined table, aliased `j`.
    Join,
}

/// A selected column with the kind used to decode its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// Side of the join the column lives on.
    pub alias: Alias,
    /// Column name.
    pub column: String,
    /// Kind used to decode the result value.
    pub kind: Kind,
}

impl SelectColumn {
    /// Creates a base-table select column.
    pub fn base(column: impl Into<String>, kind: Kind) -> Self {
        Self {
            alias: Alias::Base,
            column: column.into(),
            kind,
        }
    }

    /// Creates a joined-table select column.
    pub fn join(column: impl Into<String>, kind: Kind) -> Self {
        Self {
            alias: Alias::Join,
            column: column.into(),
            kind,
        }
    }
}

/// An equality join clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// The joined table (aliased `j`).
    pub table: TableRef,
    /// Equality pairs: (joined-table column, base-table column).
    pub on: Vec<(String, String)>,
}

/// A query returning rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOp {
    /// The base table (aliased `t`).
    pub table: TableRef,
    /// Optional single equality join.
    pub join: Option<Join>,
    /// Columns to return, in order.
    pub columns: Vec<SelectColumn>,
    /// Conjunction of equality predicates.
    pub filter: Vec<Eq>,
}

/// A mutation statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DmlOp {
    /// Insert one row.
    Insert {
        /// Target table.
        table: TableRef,
        /// Column values, in order.
        values: Vec<ColumnValue>,
    },
    /// Update columns on rows matching the filter.
    Update {
        /// Target table.
        table: TableRef,
        /// Columns to set.
        set: Vec<ColumnValue>,
        /// Row filter.
        filter: Vec<Eq>,
    },
    /// Delete rows matching the filter.
    Delete {
        /// Target table.
        table: TableRef,
        /// Row filter.
        filter: Vec<Eq>,
        /// Delete at most one matching row.
        limit_one: bool,
    },
    /// Insert a row, or leave an existing row with the same key untouched.
    ///
    /// Used for many-to-many join rows, where the whole row is the key.
    Upsert {
        /// Target table.
        table: TableRef,
        /// Key columns (the conflict target).
        key: Vec<ColumnValue>,
        /// Non-key columns written on insert.
        values: Vec<ColumnValue>,
    },
}

impl DmlOp {
    /// Returns the table this op mutates.
    pub fn table(&self) -> &TableRef {
        match self {
            DmlOp::Insert { table, .. }
            | DmlOp::Update { table, .. }
            | DmlOp::Delete { table, .. }
            | DmlOp::Upsert { table, .. } => table,
        }
    }
}

/// A column definition for CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column kind.
    pub kind: Kind,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Default value.
    pub default: Option<Value>,
}

/// Referential action for foreign-key constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkAction {
    /// NO ACTION.
    NoAction,
    /// CASCADE.
    Cascade,
    /// SET NULL.
    SetNull,
}

impl FkAction {
    /// Renders the action keyword.
    pub fn as_sql(self) -> &'static str {
        match self {
            FkAction::NoAction => "NO ACTION",
            FkAction::Cascade => "CASCADE",
            FkAction::SetNull => "SET NULL",
        }
    }
}

/// A DDL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlOp {
    /// CREATE SCHEMA IF NOT EXISTS.
    CreateSchema {
        /// Schema name.
        schema: String,
    },
    /// CREATE TABLE IF NOT EXISTS with an inline primary key.
    CreateTable {
        /// Target table.
        table: TableRef,
        /// Column definitions in order.
        columns: Vec<ColumnDef>,
        /// Primary key column names.
        primary_key: Vec<String>,
    },
    /// CREATE INDEX IF NOT EXISTS.
    CreateIndex {
        /// Index name.
        name: String,
        /// Target table.
        table: TableRef,
        /// Indexed columns.
        columns: Vec<String>,
    },
    /// ALTER TABLE ADD CONSTRAINT ... FOREIGN KEY.
    AddForeignKey {
        /// Constraint name.
        name: String,
        /// Referring table.
        table: TableRef,
        /// Referring columns.
        columns: Vec<String>,
        /// Referenced table.
        target: TableRef,
        /// Referenced columns.
        target_columns: Vec<String>,
        /// ON DELETE action.
        on_delete: FkAction,
        /// ON UPDATE action.
        on_update: FkAction,
    },
}
