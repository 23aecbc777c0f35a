//! # LiveRow SQL
//!
//! Dual-dialect SQL/DDL builder for LiveRow.
//!
//! This crate provides:
//! - A constrained statement AST ([`DmlOp`], [`SelectOp`], [`DdlOp`],
//!   [`TriggerDef`]) covering point DML by id, equality-join selects,
//!   join-row upsert/delete, and basic DDL with constraints and triggers
//! - Rendering of every op in both supported dialects
//!   ([`Dialect::Embedded`], [`Dialect::Postgres`])
//! - Templated statement builders consumed by the field accessors
//! - A stable schema dump (tables before constraints before triggers,
//!   declaration order within a category)
//!
//! ## Dialects
//!
//! Dialect differences are isolated to identifier quoting, upsert syntax
//! (`MERGE INTO ... KEY` vs `INSERT ... ON CONFLICT`), and single-row
//! DELETE targeting (`LIMIT 1` vs a `ctid` subselect). Everything else
//! renders identically.
//!
//! The embedded store executes the structured ops directly; the text
//! renderings exist for the production store and for schema dumps.
//! Malformed link specifications fail here, at build time, never at
//! execution time.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ddl;
mod dialect;
mod error;
mod ops;
mod render;
mod templates;
mod trigger;

pub use ddl::{schema_ops, schema_statements, schema_triggers, table_ddl};
pub use dialect::{Dialect, StatementPair};
pub use error::{SqlBuildError, SqlResult};
pub use ops::{
    Alias, ColumnDef, ColumnValue, DdlOp, DmlOp, Eq, FkAction, Join, SelectColumn, SelectOp,
};
pub use render::{render_ddl, render_dml, render_select};
pub use templates::{
    collection_select, delete_by_id, insert_row, join_row_delete, join_row_upsert, select_by_id,
    select_ids, set_null_update, update_columns,
};
pub use trigger::{
    backing_notify_trigger, delete_triggers, notify_trigger, render_trigger, trigger_name,
    TriggerAction, TriggerDef, TriggerLink, NOTIFY_CHANNEL,
};
