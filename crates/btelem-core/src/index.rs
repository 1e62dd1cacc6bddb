//! Shared packet-header scanning and log-file footer index bookkeeping.
//!
//! Both the log writer (building the index as it appends) and the log
//! reader/capture (consulting or rebuilding the index) need to walk a
//! packet's entry header table without decoding any payload bytes. That
//! scan lives here once.

use btelem_proto::{EntryHeader, PacketHeaderVersion, ENTRY_HEADER_SIZE};

/// File magic: `"BTLM"`.
pub const FILE_MAGIC: &[u8; 4] = b"BTLM";
/// Current file format version.
pub const FILE_VERSION: u16 = 1;
/// Size in bytes of the fixed file header (`magic || version || schema_len`).
pub const FILE_HEADER_SIZE: usize = 4 + 2 + 4;
/// Footer magic `"BTLI"`, as the little-endian `u32` it is stored as.
pub const FOOTER_MAGIC: u32 = 0x494C_5442;
/// Size in bytes of one index entry record.
pub const INDEX_ENTRY_SIZE: usize = 8 + 8 + 8 + 4;
/// Size in bytes of the trailing footer record.
pub const FOOTER_SIZE: usize = 8 + 4 + 4;

/// One footer index record: a packet's file offset and time/entry summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Byte offset of the packet (its header) within the file.
    pub offset: u64,
    /// Minimum entry timestamp within the packet.
    pub ts_min: u64,
    /// Maximum entry timestamp within the packet.
    pub ts_max: u64,
    /// Number of entries in the packet.
    pub entry_count: u32,
}

impl IndexEntry {
    /// Decode one 28-byte index record.
    #[must_use]
    pub fn from_bytes(buf: &[u8; INDEX_ENTRY_SIZE]) -> Self {
        Self {
            offset: u64::from_le_bytes(buf[0..8].try_into().unwrap_or_default()),
            ts_min: u64::from_le_bytes(buf[8..16].try_into().unwrap_or_default()),
            ts_max: u64::from_le_bytes(buf[16..24].try_into().unwrap_or_default()),
            entry_count: u32::from_le_bytes(buf[24..28].try_into().unwrap_or_default()),
        }
    }

    /// Encode this record to its 28-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.ts_min.to_le_bytes());
        buf[16..24].copy_from_slice(&self.ts_max.to_le_bytes());
        buf[24..28].copy_from_slice(&self.entry_count.to_le_bytes());
        buf
    }
}

/// One entry header located within a packet, plus its payload's absolute
/// byte range within the *packet* buffer (not the file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedEntry {
    /// The raw entry header.
    pub header: EntryHeader,
    /// Start offset of this entry's payload within the packet buffer.
    pub payload_start: usize,
    /// End offset (exclusive) of this entry's payload within the packet buffer.
    pub payload_end: usize,
}

/// Walk a packet's entry header table, skipping any entry whose payload
/// range doesn't fit the buffer (mirrors `decode_packet`'s overrun rule,
/// without paying for a full field decode).
#[must_use]
pub fn scan_packet_entries(packet: &[u8], header_version: PacketHeaderVersion) -> Vec<ScannedEntry> {
    let header_size = header_version.header_size();
    let Ok(fields) = header_version.parse(packet.get(..header_size).unwrap_or(&[])) else {
        return Vec::new();
    };
    let payload_base = header_size + usize::from(fields.entry_count) * ENTRY_HEADER_SIZE;

    let mut out = Vec::with_capacity(usize::from(fields.entry_count));
    for i in 0..usize::from(fields.entry_count) {
        let start = header_size + i * ENTRY_HEADER_SIZE;
        let Some(slice) = packet.get(start..) else { break };
        let Ok(header) = EntryHeader::parse(slice) else { break };
        let payload_start = payload_base + header.payload_offset() as usize;
        let payload_end = payload_start + usize::from(header.payload_size());
        if payload_end > packet.len() {
            continue;
        }
        out.push(ScannedEntry { header, payload_start, payload_end });
    }
    out
}

/// Derive `(ts_min, ts_max, entry_count)` for one packet, for use by the log
/// writer's append-time index bookkeeping.
///
/// `ts_min`/`ts_max` come from a header-only scan of the entries that
/// actually fit the buffer. `entry_count` comes straight from the packet's
/// own header field instead, so a malformed packet whose declared count
/// includes an entry overrunning the buffer still gets its producer-stated
/// count persisted into the index, rather than a silently smaller one.
#[must_use]
pub fn packet_stats(packet: &[u8], header_version: PacketHeaderVersion) -> (u64, u64, u32) {
    let entries = scan_packet_entries(packet, header_version);
    let ts_min = entries.iter().map(|e| e.header.timestamp()).min().unwrap_or(0);
    let ts_max = entries.iter().map(|e| e.header.timestamp()).max().unwrap_or(0);
    let entry_count = header_declared_entry_count(packet, header_version);
    (ts_min, ts_max, entry_count)
}

/// Read a packet's own declared entry count straight from its header,
/// without filtering it through a bounds scan.
pub(crate) fn header_declared_entry_count(packet: &[u8], header_version: PacketHeaderVersion) -> u32 {
    let header_size = header_version.header_size();
    header_version.parse(packet.get(..header_size).unwrap_or(&[])).map_or(0, |fields| u32::from(fields.entry_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use btelem_proto::build_packet;

    #[test]
    fn packet_stats_reports_timestamp_bounds() {
        let packet = build_packet(
            &[(1, 1000, vec![1, 2]), (1, 500, vec![3, 4]), (1, 2000, vec![5, 6])],
            PacketHeaderVersion::V1,
        );
        let (ts_min, ts_max, count) = packet_stats(&packet, PacketHeaderVersion::V1);
        assert_eq!(ts_min, 500);
        assert_eq!(ts_max, 2000);
        assert_eq!(count, 3);
    }

    #[test]
    fn index_entry_round_trips_bytes() {
        let entry = IndexEntry { offset: 10, ts_min: 20, ts_max: 30, entry_count: 4 };
        let parsed = IndexEntry::from_bytes(&entry.to_bytes());
        assert_eq!(entry, parsed);
    }

    #[test]
    fn footer_magic_matches_spec_constant() {
        assert_eq!(FOOTER_MAGIC, 0x494C_5442);
    }

    #[test]
    fn packet_stats_entry_count_survives_a_truncated_payload() {
        let mut packet =
            build_packet(&[(1, 1000, vec![1, 2]), (1, 2000, vec![3, 4])], PacketHeaderVersion::V1);
        // Truncate the payload blob so the second entry overruns the buffer;
        // scan_packet_entries only sees the first.
        packet.truncate(packet.len() - 2);
        let scanned = scan_packet_entries(&packet, PacketHeaderVersion::V1);
        assert_eq!(scanned.len(), 1);

        let (_, _, count) = packet_stats(&packet, PacketHeaderVersion::V1);
        assert_eq!(count, 2, "entry_count must come from the packet's own header, not the bounds-filtered scan");
    }
}
