//! Error types for statement building.

use thiserror::Error;

/// Result type for statement building.
pub type SqlResult<T> = Result<T, SqlBuildError>;

/// Errors raised while building statements from descriptors.
///
/// All of these surface at build time; a successfully built op renders in
/// both dialects without further failure modes.
#[derive(Debug, Error)]
pub enum SqlBuildError {
    /// A link names a table that is not part of the schema being built.
    #[error("link target {table} is not a registered table")]
    UnknownLinkTarget {
        /// The missing table, `schema.table` form.
        table: String,
    },

    /// A link names a column its target table does not declare.
    #[error("link column {column} does not exist on {table}")]
    UnknownLinkColumn {
        /// The table searched.
        table: String,
        /// The missing column.
        column: String,
    },

    /// Link column counts do not line up with the target's id columns.
    #[error("link arity mismatch on {table}: expected {expected} columns, got {actual}")]
    LinkArityMismatch {
        /// The target table.
        table: String,
        /// Expected column count.
        expected: usize,
        /// Actual column count.
        actual: usize,
    },

    /// An op was built with no columns to write or select.
    #[error("statement on {table} has no columns")]
    EmptyColumnList {
        /// The table targeted.
        table: String,
    },
}
