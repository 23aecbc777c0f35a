//! Error types for store backends.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store and cache-tier operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity loss or failure to establish a connection.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// A statement inside a transaction failed; the transaction was rolled
    /// back in full.
    #[error("transaction rolled back: {message}")]
    Transaction {
        /// Description of the failing statement.
        message: String,
    },

    /// A single statement failed outside a transaction.
    #[error("statement failed: {message}")]
    Statement {
        /// Description of the failure.
        message: String,
    },

    /// A statement referenced a table the store does not have.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// The missing table, `schema.table` form.
        table: String,
    },

    /// A row violated a NOT NULL or primary-key constraint.
    #[error("constraint violation on {table}: {message}")]
    Constraint {
        /// The table the row targets.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// A change-feed or cache payload could not be decoded.
    #[error("malformed payload: {message}")]
    Payload {
        /// Description of the problem.
        message: String,
    },

    /// Value codec failure while materializing rows.
    #[error("codec error: {0}")]
    Codec(#[from] liverow_codec::CodecError),

    /// Statement build failure.
    #[error("statement build error: {0}")]
    Build(#[from] liverow_sql::SqlBuildError),
}

impl StoreError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a statement error.
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-payload error.
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }
}

impl From<postgres::Error> for StoreError {
    fn from(e: postgres::Error) -> Self {
        if e.is_closed() {
            Self::connection(e.to_string())
        } else {
            Self::statement(e.to_string())
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            Self::connection(e.to_string())
        } else {
            Self::statement(e.to_string())
        }
    }
}
