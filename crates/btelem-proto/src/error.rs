//! Wire-level error taxonomy.
//!
//! Mirrors the layered-error convention used throughout the workspace:
//! small, `Clone + PartialEq` enums that compare cleanly in tests, with a
//! `Display` message suitable for CLI output.

use thiserror::Error;

/// Errors that can occur while parsing or encoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Not enough bytes remained to decode a fixed-size structure.
    #[error("truncated {what}: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// What was being decoded (e.g. "schema header", "file header").
        what: &'static str,
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually available.
        actual: usize,
    },

    /// A magic number did not match the expected constant.
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// Expected magic value.
        expected: u32,
        /// Magic value actually read.
        found: u32,
    },

    /// The file or stream declared a version this build does not understand.
    #[error("unsupported version: {found}")]
    UnsupportedVersion {
        /// Version field as read from the wire.
        found: u16,
    },

    /// The framer observed a length prefix exceeding the configured maximum.
    ///
    /// Not propagated as a hard failure by the framer itself (resync is an
    /// internal, log-only event per the stream-framer contract) — exposed
    /// here so callers that want to observe it explicitly (tests, metrics)
    /// can match on it.
    #[error("oversized packet: length {len} exceeds max {max}")]
    OversizedPacket {
        /// Length prefix read from the stream.
        len: u32,
        /// Configured maximum packet size.
        max: u32,
    },
}

/// Convenience alias used throughout `btelem-proto`.
pub type Result<T> = std::result::Result<T, ProtoError>;
