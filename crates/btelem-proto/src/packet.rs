//! Packed-batch packet codec: `build_packet` / `decode_packet`.

use std::collections::HashSet;

use crate::header::{EntryHeader, PacketHeaderFields, PacketHeaderVersion, ENTRY_HEADER_SIZE};
use crate::schema::Schema;
use crate::value::FieldValue;

/// One entry to pack: `(entry id, timestamp nanoseconds, payload bytes)`.
pub type RawEntry = (u16, u64, Vec<u8>);

/// A decoded entry, materialized for event-log style consumption.
///
/// Column extraction (`btelem-core`'s capture engine) bypasses this type
/// entirely and reads entry headers and payload bytes directly.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    /// Schema entry id.
    pub id: u16,
    /// Entry timestamp in nanoseconds.
    pub timestamp: u64,
    /// Entry name resolved from the schema, or `None` for an unknown id.
    pub name: Option<String>,
    /// Declared payload size, in bytes, from the entry header.
    pub payload_size: u16,
    /// Raw payload bytes.
    pub raw_payload: Vec<u8>,
    /// Ordered `field name -> value` map. Empty for an unknown entry id.
    pub fields: Vec<(String, FieldValue)>,
}

/// Result of decoding one packet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketResult {
    /// Entries decoded from the packet, in wire order.
    pub entries: Vec<DecodedEntry>,
    /// Producer-reported drop count from the packet header (0 for legacy
    /// headers, which carry no drop accounting).
    pub dropped: u32,
}

/// Pack `entries` into one wire packet using the given header version.
///
/// Entries appear in the order supplied; timestamps are neither sorted nor
/// validated. `dropped` is always written as 0 — this function packs
/// entries the caller already has in hand, it does not itself discard any.
#[must_use]
pub fn build_packet(entries: &[RawEntry], header_version: PacketHeaderVersion) -> Vec<u8> {
    let mut entry_headers = Vec::with_capacity(entries.len());
    let mut payload_blob = Vec::new();
    let mut offset: u32 = 0;

    for (id, ts, payload) in entries {
        #[allow(clippy::cast_possible_truncation)]
        let payload_size = payload.len() as u32;
        #[allow(clippy::cast_possible_truncation)]
        entry_headers.push(EntryHeader::new(*id, payload_size as u16, offset, *ts));
        payload_blob.extend_from_slice(payload);
        offset += payload_size;
    }

    #[allow(clippy::cast_possible_truncation)]
    let header_fields = PacketHeaderFields {
        entry_count: entries.len() as u16,
        flags: 0,
        payload_size: offset,
        dropped: 0,
    };

    let mut out = header_version.encode(&header_fields);
    for eh in &entry_headers {
        out.extend_from_slice(eh.as_bytes());
    }
    out.extend_from_slice(&payload_blob);
    out
}

/// Decode one packet's entries, optionally restricted to `filter_ids`.
///
/// Never returns an error: a buffer too short to hold even the packet
/// header decodes as zero entries with `dropped = 0`; an entry whose
/// payload range overruns the buffer is skipped (and logged) without
/// aborting the rest of the packet; an unknown entry id decodes to an
/// opaque entry with an empty field map.
#[must_use]
pub fn decode_packet(
    schema: &Schema,
    bytes: &[u8],
    filter_ids: Option<&HashSet<u16>>,
    header_version: PacketHeaderVersion,
) -> PacketResult {
    let header_size = header_version.header_size();
    if bytes.len() < header_size {
        return PacketResult::default();
    }
    let Ok(header_fields) = header_version.parse(&bytes[..header_size]) else {
        return PacketResult::default();
    };

    let payload_base = header_size + usize::from(header_fields.entry_count) * ENTRY_HEADER_SIZE;
    let mut entries = Vec::with_capacity(usize::from(header_fields.entry_count));

    for i in 0..usize::from(header_fields.entry_count) {
        let eh_start = header_size + i * ENTRY_HEADER_SIZE;
        let Ok(eh) = EntryHeader::parse(&bytes[eh_start.min(bytes.len())..]) else {
            break;
        };

        if let Some(filter) = filter_ids
            && !filter.contains(&eh.id())
        {
            continue;
        }

        let start = payload_base + eh.payload_offset() as usize;
        let end = start + usize::from(eh.payload_size());
        if end > bytes.len() {
            tracing::warn!(entry_id = eh.id(), "entry payload overruns packet, skipping");
            continue;
        }
        let payload = &bytes[start..end];

        let (name, fields) = match schema.entry_by_id(eh.id()) {
            Some(entry) => (Some(entry.name.clone()), schema.decode_fields(entry, payload)),
            None => {
                tracing::debug!(entry_id = eh.id(), "decoding unknown entry id as opaque");
                (None, Vec::new())
            }
        };

        entries.push(DecodedEntry {
            id: eh.id(),
            timestamp: eh.timestamp(),
            name,
            payload_size: eh.payload_size(),
            raw_payload: payload.to_vec(),
            fields,
        });
    }

    PacketResult { entries, dropped: header_fields.dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Endian, FieldDef, SchemaEntry};
    use crate::types::BtelemType;

    fn temp_schema() -> Schema {
        let value = FieldDef::new("value", 0, 4, BtelemType::F32, 1);
        let temp = SchemaEntry::new(7, "temp", 4, vec![value]);
        let rpm_field = FieldDef::new("rpm", 0, 4, BtelemType::U32, 1);
        let rpm = SchemaEntry::new(8, "rpm", 4, vec![rpm_field]);
        Schema::new(vec![temp, rpm], Endian::Little)
    }

    #[test]
    fn scenario_a_single_entry_round_trip() {
        let schema = temp_schema();
        let packet = build_packet(&[(7, 1000, 25.5f32.to_le_bytes().to_vec())], PacketHeaderVersion::V1);
        let result = decode_packet(&schema, &packet, None, PacketHeaderVersion::V1);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.entries.len(), 1);
        let e = &result.entries[0];
        assert_eq!(e.id, 7);
        assert_eq!(e.timestamp, 1000);
        assert_eq!(e.fields, vec![("value".to_string(), FieldValue::F32(25.5))]);
    }

    #[test]
    fn scenario_b_filter_ids_decode() {
        let schema = temp_schema();
        let entries = vec![
            (7, 1000, 25.5f32.to_le_bytes().to_vec()),
            (8, 1500, 3200u32.to_le_bytes().to_vec()),
            (7, 2000, 26.0f32.to_le_bytes().to_vec()),
        ];
        let packet = build_packet(&entries, PacketHeaderVersion::V1);
        let filter: HashSet<u16> = [8].into_iter().collect();
        let result = decode_packet(&schema, &packet, Some(&filter), PacketHeaderVersion::V1);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].id, 8);
        assert_eq!(result.entries[0].timestamp, 1500);
        assert_eq!(result.entries[0].fields, vec![("rpm".to_string(), FieldValue::U32(3200))]);
    }

    #[test]
    fn short_buffer_decodes_as_empty_not_an_error() {
        let schema = temp_schema();
        let result = decode_packet(&schema, &[0u8; 3], None, PacketHeaderVersion::V1);
        assert_eq!(result, PacketResult::default());
    }

    #[test]
    fn unknown_entry_id_decodes_as_opaque() {
        let schema = temp_schema();
        let packet = build_packet(&[(999, 1, vec![1, 2, 3])], PacketHeaderVersion::V1);
        let result = decode_packet(&schema, &packet, None, PacketHeaderVersion::V1);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].name, None);
        assert!(result.entries[0].fields.is_empty());
        assert_eq!(result.entries[0].raw_payload, vec![1, 2, 3]);
    }

    #[test]
    fn overrunning_entry_is_skipped_not_fatal() {
        let schema = temp_schema();
        let mut packet = build_packet(&[(7, 1, 25.5f32.to_le_bytes().to_vec())], PacketHeaderVersion::V1);
        // Truncate the payload blob so the one entry's range overruns.
        packet.truncate(packet.len() - 2);
        let result = decode_packet(&schema, &packet, None, PacketHeaderVersion::V1);
        assert!(result.entries.is_empty());
    }

    #[test]
    fn legacy_header_reports_zero_dropped() {
        let schema = temp_schema();
        let packet = build_packet(&[(7, 1, 25.5f32.to_le_bytes().to_vec())], PacketHeaderVersion::Legacy);
        let result = decode_packet(&schema, &packet, None, PacketHeaderVersion::Legacy);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.entries.len(), 1);
    }

    #[test]
    fn entries_preserve_wire_order_regardless_of_timestamp() {
        let schema = temp_schema();
        let entries = vec![
            (7, 5000, 1.0f32.to_le_bytes().to_vec()),
            (7, 1000, 2.0f32.to_le_bytes().to_vec()),
        ];
        let packet = build_packet(&entries, PacketHeaderVersion::V1);
        let result = decode_packet(&schema, &packet, None, PacketHeaderVersion::V1);
        let timestamps: Vec<u64> = result.entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![5000, 1000]);
    }

    proptest::proptest! {
        #[test]
        fn build_decode_round_trips_arbitrary_entry_lists(
            entries in proptest::collection::vec(
                (7u16, proptest::num::u64::ANY, proptest::num::f32::ANY),
                0..8,
            ),
        ) {
            let schema = temp_schema();
            let raw: Vec<RawEntry> = entries
                .iter()
                .map(|(id, ts, v)| (*id, *ts, v.to_le_bytes().to_vec()))
                .collect();
            let packet = build_packet(&raw, PacketHeaderVersion::V1);
            let result = decode_packet(&schema, &packet, None, PacketHeaderVersion::V1);
            proptest::prop_assert_eq!(result.dropped, 0);
            proptest::prop_assert_eq!(result.entries.len(), entries.len());
            for ((_, ts, v), decoded) in entries.iter().zip(result.entries.iter()) {
                proptest::prop_assert_eq!(decoded.timestamp, *ts);
                proptest::prop_assert_eq!(&decoded.fields, &vec![("value".to_string(), FieldValue::F32(*v))]);
            }
        }
    }
}
