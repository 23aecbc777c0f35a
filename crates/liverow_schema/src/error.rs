//! Error types for schema registration.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while parsing or registering type metadata.
///
/// Schema errors are fatal: they surface at registration time and are never
/// retried.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema or table name is missing.
    #[error("type {type_name} declares no schema/table")]
    MissingTable {
        /// Offending type.
        type_name: String,
    },

    /// No id columns, or an id column with no name.
    #[error("type {type_name} declares no usable id column")]
    MissingIdColumn {
        /// Offending type.
        type_name: String,
    },

    /// A field entry with no name.
    #[error("type {type_name} declares a field with no name")]
    EmptyField {
        /// Offending type.
        type_name: String,
    },

    /// A scalar or reference entry with no column name.
    #[error("field {field} of type {type_name} declares no column")]
    EmptyColumn {
        /// Offending type.
        type_name: String,
        /// Offending field.
        field: String,
    },

    /// Two entries claim the same column.
    #[error("type {type_name} declares column {column} twice")]
    DuplicateColumn {
        /// Offending type.
        type_name: String,
        /// Duplicated column.
        column: String,
    },

    /// A field carries more than one of reference/collection/cache
    /// annotations.
    #[error("field {field} of type {type_name} carries conflicting annotations")]
    ConflictingAnnotations {
        /// Offending type.
        type_name: String,
        /// Offending field.
        field: String,
    },

    /// A link names a column the type does not declare.
    #[error("field {field} of type {type_name} links unknown column {column}")]
    UnknownLinkColumn {
        /// Offending type.
        type_name: String,
        /// Offending field.
        field: String,
        /// Unknown column.
        column: String,
    },

    /// A many-to-many collection without a join table.
    #[error("field {field} of type {type_name} declares no join table")]
    MissingJoinTable {
        /// Offending type.
        type_name: String,
        /// Offending field.
        field: String,
    },

    /// A malformed link specification.
    #[error("field {field} of type {type_name} has a malformed link: {message}")]
    BadLink {
        /// Offending type.
        type_name: String,
        /// Offending field.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// Two distinct types claim the same (schema, table).
    #[error("table {schema}.{table} is registered by two types")]
    DuplicateTable {
        /// Schema name.
        schema: String,
        /// Table name.
        table: String,
    },

    /// A type was described before being registered.
    #[error("type {type_name} is not registered")]
    UnknownType {
        /// Unregistered type.
        type_name: String,
    },
}

impl SchemaError {
    /// Creates a missing-table error.
    pub fn missing_table(type_name: impl Into<String>) -> Self {
        Self::MissingTable {
            type_name: type_name.into(),
        }
    }

    /// Creates an empty-field error.
    pub fn empty_field(type_name: impl Into<String>) -> Self {
        Self::EmptyField {
            type_name: type_name.into(),
        }
    }

    /// Creates an empty-column error.
    pub fn empty_column(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::EmptyColumn {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Creates a bad-link error.
    pub fn bad_link(
        type_name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BadLink {
            type_name: type_name.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}
