//! Error types for the codec.

use crate::value::Kind;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A value cannot be represented in the canonical text encoding.
    #[error("cannot encode {kind:?} value: {message}")]
    Unencodable {
        /// Kind of the offending value.
        kind: Kind,
        /// Description of why the value cannot be encoded.
        message: String,
    },

    /// Text could not be parsed as the requested kind.
    #[error("cannot decode {text:?} as {kind:?}")]
    Parse {
        /// Kind the caller asked for.
        kind: Kind,
        /// The offending text.
        text: String,
    },

    /// A hex byte string was malformed.
    #[error("malformed byte string: {text:?}")]
    MalformedBytes {
        /// The offending text.
        text: String,
    },
}

impl CodecError {
    /// Creates an unencodable-value error.
    pub fn unencodable(kind: Kind, message: impl Into<String>) -> Self {
        Self::Unencodable {
            kind,
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(kind: Kind, text: impl Into<String>) -> Self {
        Self::Parse {
            kind,
            text: text.into(),
        }
    }
}
