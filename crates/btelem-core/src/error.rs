//! Core-layer error taxonomy: wraps [`btelem_proto::ProtoError`] and adds
//! the query/transport failures that only make sense once I/O is involved.

use btelem_proto::ProtoError;
use thiserror::Error;

/// Errors surfaced by log files, captures, and transport plumbing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A wire-level parse failure, unchanged from `btelem-proto`.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// A query named an entry or field not present in the schema.
    #[error("unknown channel: entry {entry:?}{}", field.as_deref().map(|f| format!(", field {f:?}")).unwrap_or_default())]
    UnknownChannel {
        /// Entry name requested by the caller.
        entry: String,
        /// Field name requested by the caller, if any.
        field: Option<String>,
    },

    /// A transport reported end-of-stream during a mandatory read.
    #[error("connection closed")]
    ConnectionClosed,

    /// An underlying filesystem or socket operation failed.
    ///
    /// Stored as a rendered message rather than the original `io::Error`
    /// so this enum stays `Clone + PartialEq`, which the test suite relies
    /// on throughout.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Convenience alias used throughout `btelem-core`.
pub type Result<T> = std::result::Result<T, CoreError>;
