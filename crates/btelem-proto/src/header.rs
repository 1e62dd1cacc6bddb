//! Fixed-size packet and entry headers.
//!
//! Packed, zero-copy-castable structs store every multi-byte field as a raw
//! byte array rather than a native integer, so the in-memory representation
//! never depends on host endianness or alignment — only the accessor
//! methods interpret the bytes, always as little-endian per the wire
//! contract (packet/entry headers are little-endian regardless of the
//! schema's payload endian flag).

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{ProtoError, Result};

/// Size in bytes of an [`EntryHeader`] on the wire.
pub const ENTRY_HEADER_SIZE: usize = 16;

/// One entry's position and timing within a packet's payload blob.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone, Copy)]
#[repr(C, packed)]
pub struct EntryHeader {
    id: [u8; 2],
    payload_size: [u8; 2],
    payload_offset: [u8; 4],
    timestamp: [u8; 8],
}

impl EntryHeader {
    /// Build a header from decoded field values.
    #[must_use]
    pub fn new(id: u16, payload_size: u16, payload_offset: u32, timestamp: u64) -> Self {
        Self {
            id: id.to_le_bytes(),
            payload_size: payload_size.to_le_bytes(),
            payload_offset: payload_offset.to_le_bytes(),
            timestamp: timestamp.to_le_bytes(),
        }
    }

    /// Schema entry id this header describes.
    #[must_use]
    pub fn id(&self) -> u16 {
        u16::from_le_bytes(self.id)
    }

    /// Size, in bytes, of this entry's payload slice.
    #[must_use]
    pub fn payload_size(&self) -> u16 {
        u16::from_le_bytes(self.payload_size)
    }

    /// Byte offset of this entry's payload, relative to the start of the
    /// packet's payload blob.
    #[must_use]
    pub fn payload_offset(&self) -> u32 {
        u32::from_le_bytes(self.payload_offset)
    }

    /// Entry timestamp in nanoseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        u64::from_le_bytes(self.timestamp)
    }

    /// Parse one header from the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENTRY_HEADER_SIZE {
            return Err(ProtoError::Truncated {
                what: "entry header",
                expected: ENTRY_HEADER_SIZE,
                actual: buf.len(),
            });
        }
        let mut header = Self::new(0, 0, 0, 0);
        header.as_mut_bytes().copy_from_slice(&buf[..ENTRY_HEADER_SIZE]);
        Ok(header)
    }
}

impl std::fmt::Debug for EntryHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryHeader")
            .field("id", &self.id())
            .field("payload_size", &self.payload_size())
            .field("payload_offset", &self.payload_offset())
            .field("timestamp", &self.timestamp())
            .finish()
    }
}

impl PartialEq for EntryHeader {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
            && self.payload_size() == other.payload_size()
            && self.payload_offset() == other.payload_offset()
            && self.timestamp() == other.timestamp()
    }
}
impl Eq for EntryHeader {}

/// Which on-the-wire packet header shape a stream or file uses.
///
/// Never auto-detected: a stream's or file's header version is a stated
/// configuration choice, not sniffed from the bytes, since the two shapes
/// are not self-distinguishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PacketHeaderVersion {
    /// 16-byte header with `dropped`/`reserved`. Default; the only form the
    /// reference producer actually emits.
    #[default]
    V1,
    /// 8-byte header with no drop accounting, kept for older producers.
    Legacy,
}

impl PacketHeaderVersion {
    /// Size in bytes of a header of this version.
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            Self::V1 => 16,
            Self::Legacy => 8,
        }
    }

    /// Parse a header of this version from the front of `buf`.
    pub fn parse(self, buf: &[u8]) -> Result<PacketHeaderFields> {
        let size = self.header_size();
        if buf.len() < size {
            return Err(ProtoError::Truncated { what: "packet header", expected: size, actual: buf.len() });
        }
        let entry_count = u16::from_le_bytes([buf[0], buf[1]]);
        let flags = u16::from_le_bytes([buf[2], buf[3]]);
        let payload_size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let dropped = match self {
            Self::V1 => u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            Self::Legacy => 0,
        };
        Ok(PacketHeaderFields { entry_count, flags, payload_size, dropped })
    }

    /// Serialize `fields` as a header of this version.
    ///
    /// `fields.dropped` is silently discarded when encoding a `Legacy`
    /// header, which has no field to carry it in.
    #[must_use]
    pub fn encode(self, fields: &PacketHeaderFields) -> Vec<u8> {
        let mut buf = vec![0u8; self.header_size()];
        buf[0..2].copy_from_slice(&fields.entry_count.to_le_bytes());
        buf[2..4].copy_from_slice(&fields.flags.to_le_bytes());
        buf[4..8].copy_from_slice(&fields.payload_size.to_le_bytes());
        if self == Self::V1 {
            buf[8..12].copy_from_slice(&fields.dropped.to_le_bytes());
            // buf[12..16] (reserved) stays zero.
        }
        buf
    }
}

/// Decoded packet header fields, independent of wire version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeaderFields {
    /// Number of entry headers following this header.
    pub entry_count: u16,
    /// Producer-defined flags; no bits are currently assigned meaning.
    pub flags: u16,
    /// Total size in bytes of the payload blob (sum of entry payload sizes).
    pub payload_size: u32,
    /// Entries the producer discarded before emission; 0 for a legacy header.
    pub dropped: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn entry_header_round_trip() {
        let h = EntryHeader::new(7, 4, 0, 1000);
        let bytes = h.as_bytes();
        let parsed = EntryHeader::parse(bytes).expect("should parse");
        assert_eq!(h, parsed);
    }

    #[test]
    fn entry_header_reject_short_buffer() {
        let err = EntryHeader::parse(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, ProtoError::Truncated { .. }));
    }

    #[test]
    fn packet_header_v1_round_trip() {
        let fields = PacketHeaderFields { entry_count: 3, flags: 0, payload_size: 100, dropped: 2 };
        let bytes = PacketHeaderVersion::V1.encode(&fields);
        assert_eq!(bytes.len(), 16);
        let parsed = PacketHeaderVersion::V1.parse(&bytes).expect("should parse");
        assert_eq!(fields, parsed);
    }

    #[test]
    fn packet_header_legacy_round_trip_drops_dropped_field() {
        let fields = PacketHeaderFields { entry_count: 3, flags: 1, payload_size: 100, dropped: 99 };
        let bytes = PacketHeaderVersion::Legacy.encode(&fields);
        assert_eq!(bytes.len(), 8);
        let parsed = PacketHeaderVersion::Legacy.parse(&bytes).expect("should parse");
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.entry_count, 3);
    }

    #[test]
    fn packet_header_reject_short_buffer() {
        let err = PacketHeaderVersion::V1.parse(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, ProtoError::Truncated { .. }));
    }

    proptest! {
        #[test]
        fn entry_header_round_trip_arbitrary(
            id: u16, payload_size: u16, payload_offset: u32, timestamp: u64,
        ) {
            let h = EntryHeader::new(id, payload_size, payload_offset, timestamp);
            let parsed = EntryHeader::parse(h.as_bytes()).expect("should parse");
            prop_assert_eq!(h, parsed);
        }

        #[test]
        fn packet_header_v1_round_trip_arbitrary(
            entry_count: u16, flags: u16, payload_size: u32, dropped: u32,
        ) {
            let fields = PacketHeaderFields { entry_count, flags, payload_size, dropped };
            let bytes = PacketHeaderVersion::V1.encode(&fields);
            let parsed = PacketHeaderVersion::V1.parse(&bytes).expect("should parse");
            prop_assert_eq!(fields, parsed);
        }
    }
}
