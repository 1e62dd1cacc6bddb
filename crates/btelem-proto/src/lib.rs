//! Wire-level codec for the binary telemetry format: schema serialization,
//! packet encode/decode, and stream reassembly.
//!
//! This crate has no I/O of its own — it operates entirely on byte slices
//! handed to it by a caller. File and transport handling live in
//! `btelem-core`.

mod error;
mod framer;
mod header;
mod packet;
mod schema;
mod types;
mod value;

pub use error::{ProtoError, Result};
pub use framer::{frame_packet, FramerConfig, StreamFramer};
pub use header::{EntryHeader, PacketHeaderFields, PacketHeaderVersion, ENTRY_HEADER_SIZE};
pub use packet::{build_packet, decode_packet, DecodedEntry, PacketResult, RawEntry};
pub use schema::{
    BitDef, Endian, FieldDef, Schema, SchemaEntry, BITFIELD_MAX_BITS, BIT_NAME_MAX, DESC_MAX,
    ENUM_LABEL_MAX, ENUM_MAX_VALUES, MAX_FIELDS, NAME_MAX,
};
pub use types::BtelemType;
pub use value::FieldValue;
