//! Error types for the engine core.

use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
///
/// "Row not found" is not an error: resolve and reference paths return
/// `Ok(None)` for absent rows.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad or missing type metadata. Fatal, surfaced at registration time.
    #[error("schema error: {0}")]
    Schema(#[from] liverow_schema::SchemaError),

    /// Value codec failure.
    #[error("codec error: {0}")]
    Codec(#[from] liverow_codec::CodecError),

    /// Statement build failure.
    #[error("statement build error: {0}")]
    Build(#[from] liverow_sql::SqlBuildError),

    /// Store or cache-tier failure. Connection losses recover internally on
    /// the listener path and surface here for synchronous accessor calls.
    #[error("store error: {0}")]
    Store(#[from] liverow_store::StoreError),

    /// An accessor was used after its owning instance was deleted.
    #[error("stale instance: {table} {ids}")]
    StaleState {
        /// Table of the deleted instance.
        table: String,
        /// Rendered id values.
        ids: String,
    },

    /// A batch failed; every pending future in the batch carries this.
    #[error("batch transaction failed: {message}")]
    Transaction {
        /// Description of the failing statement.
        message: String,
    },

    /// A blocking wait elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The engine is shut down.
    #[error("engine is shut down")]
    Shutdown,
}

impl CoreError {
    /// Creates a stale-state error.
    pub fn stale(table: impl Into<String>, ids: impl Into<String>) -> Self {
        Self::StaleState {
            table: table.into(),
            ids: ids.into(),
        }
    }

    /// Creates a batch transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Returns true if this is a connectivity error.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            CoreError::Store(liverow_store::StoreError::Connection { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_classification() {
        let err = CoreError::Store(liverow_store::StoreError::connection("gone"));
        assert!(err.is_connection());
        assert!(!CoreError::Timeout.is_connection());
    }
}
