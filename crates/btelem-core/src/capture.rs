//! File-backed column extractor: footer-indexed time-range queries over a
//! closed log file.

use std::collections::HashMap;
use std::io::{Read, Seek};

use btelem_proto::PacketHeaderVersion;

use crate::column::{Column, ColumnBuilder};
use crate::error::{CoreError, Result};
use crate::index::{scan_packet_entries, IndexEntry};
use crate::log_reader::LogReader;

/// Column-store view over a closed log file.
///
/// Requires a footer index; if the file's footer is missing or corrupt,
/// `open` performs a one-time full scan to build an equivalent in-memory
/// index so every subsequent query can still use the indexed code path.
pub struct Capture<R: Read + Seek> {
    reader: LogReader<R>,
    index: Vec<IndexEntry>,
}

impl<R: Read + Seek> Capture<R> {
    /// Open a log file for column extraction.
    pub fn open(file: R, header_version: PacketHeaderVersion) -> Result<Self> {
        let mut reader = LogReader::open(file, header_version)?;
        let index = match reader.index() {
            Some(idx) => idx.to_vec(),
            None => reader.rebuild_index_by_scan()?,
        };
        Ok(Self { reader, index })
    }

    /// Schema this file was written against.
    #[must_use]
    pub fn schema(&self) -> &btelem_proto::Schema {
        self.reader.schema()
    }

    /// Minimum and maximum entry timestamp across the whole file.
    #[must_use]
    pub fn time_range(&self) -> Option<(u64, u64)> {
        if self.index.is_empty() {
            return None;
        }
        let t_min = self.index.iter().map(|e| e.ts_min).min().unwrap_or(0);
        let t_max = self.index.iter().map(|e| e.ts_max).max().unwrap_or(0);
        Some((t_min, t_max))
    }

    /// Total entries per schema entry name, across the whole file.
    pub fn entry_counts(&mut self) -> Result<HashMap<String, u64>> {
        let id_to_name: HashMap<u16, String> =
            self.reader.schema().entries().iter().map(|e| (e.id, e.name.clone())).collect();

        let mut counts = HashMap::new();
        for ie in self.index.clone() {
            let packet = self.reader.read_packet_at(ie.offset, ie.entry_count)?;
            let header_version = self.reader.header_version();
            for scanned in scan_packet_entries(&packet, header_version) {
                if let Some(name) = id_to_name.get(&scanned.header.id()) {
                    *counts.entry(name.clone()).or_insert(0u64) += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Extract `(timestamps, values)` for one field of one entry.
    ///
    /// Time bounds are inclusive on both sides. Uses the footer index to
    /// prune whole packets, then a counting pass to size the output
    /// exactly before a second pass fills it — this two-pass shape is
    /// load-bearing: sizing from an upper-bound estimate and truncating
    /// afterward is the exact defect this extractor must not reintroduce.
    pub fn series(
        &mut self,
        entry_name: &str,
        field_name: &str,
        t0: Option<u64>,
        t1: Option<u64>,
    ) -> Result<(Vec<u64>, Column)> {
        let (entry_id, field) = self.resolve_channel(entry_name, field_name)?;
        let lo = t0.unwrap_or(0);
        let hi = t1.unwrap_or(u64::MAX);

        let packets = self.load_candidate_packets(lo, hi)?;
        let header_version = self.reader.header_version();

        let mut count = 0usize;
        for packet in &packets {
            for scanned in scan_packet_entries(packet, header_version) {
                if scanned.header.id() == entry_id {
                    let ts = scanned.header.timestamp();
                    if ts >= lo && ts <= hi {
                        count += 1;
                    }
                }
            }
        }

        let mut timestamps = Vec::with_capacity(count);
        let mut builder = ColumnBuilder::for_field(&field, count);
        let entry = self.reader.schema().entry_by_id(entry_id).cloned();
        let Some(entry) = entry else {
            return Ok((timestamps, builder.finish()));
        };

        for packet in &packets {
            for scanned in scan_packet_entries(packet, header_version) {
                if scanned.header.id() != entry_id {
                    continue;
                }
                let ts = scanned.header.timestamp();
                if ts < lo || ts > hi {
                    continue;
                }
                let slice = &packet[scanned.payload_start..scanned.payload_end];
                let decoded = self.reader.schema().decode_fields(&entry, slice);
                if let Some((_, value)) = decoded.into_iter().find(|(n, _)| n == field_name) {
                    timestamps.push(ts);
                    builder.push(value);
                }
            }
        }

        Ok((timestamps, builder.finish()))
    }

    /// Extract every field of one entry in a single pass, keyed by field
    /// name, plus a `"_timestamp"` column.
    pub fn table(&mut self, entry_name: &str, t0: Option<u64>, t1: Option<u64>) -> Result<HashMap<String, Column>> {
        let entry = self
            .reader
            .schema()
            .entry_by_name(entry_name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownChannel { entry: entry_name.to_string(), field: None })?;
        let lo = t0.unwrap_or(0);
        let hi = t1.unwrap_or(u64::MAX);

        let packets = self.load_candidate_packets(lo, hi)?;
        let header_version = self.reader.header_version();

        let mut count = 0usize;
        for packet in &packets {
            for scanned in scan_packet_entries(packet, header_version) {
                if scanned.header.id() == entry.id {
                    let ts = scanned.header.timestamp();
                    if ts >= lo && ts <= hi {
                        count += 1;
                    }
                }
            }
        }

        let mut timestamps = Vec::with_capacity(count);
        let mut builders: HashMap<String, ColumnBuilder> =
            entry.fields.iter().map(|f| (f.name.clone(), ColumnBuilder::for_field(f, count))).collect();

        for packet in &packets {
            for scanned in scan_packet_entries(packet, header_version) {
                if scanned.header.id() != entry.id {
                    continue;
                }
                let ts = scanned.header.timestamp();
                if ts < lo || ts > hi {
                    continue;
                }
                let slice = &packet[scanned.payload_start..scanned.payload_end];
                let decoded = self.reader.schema().decode_fields(&entry, slice);
                timestamps.push(ts);
                for (name, value) in decoded {
                    if let Some(builder) = builders.get_mut(&name) {
                        builder.push(value);
                    }
                }
            }
        }

        let mut out: HashMap<String, Column> =
            builders.into_iter().map(|(name, builder)| (name, builder.finish())).collect();
        out.insert("_timestamp".to_string(), Column::U64(timestamps));
        Ok(out)
    }

    fn resolve_channel(&self, entry_name: &str, field_name: &str) -> Result<(u16, btelem_proto::FieldDef)> {
        let entry = self
            .reader
            .schema()
            .entry_by_name(entry_name)
            .ok_or_else(|| CoreError::UnknownChannel { entry: entry_name.to_string(), field: None })?;
        let field = entry
            .fields
            .iter()
            .find(|f| f.name == field_name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownChannel {
                entry: entry_name.to_string(),
                field: Some(field_name.to_string()),
            })?;
        Ok((entry.id, field))
    }

    fn load_candidate_packets(&mut self, lo: u64, hi: u64) -> Result<Vec<Vec<u8>>> {
        let candidates: Vec<IndexEntry> =
            self.index.iter().copied().filter(|ie| ie.ts_max >= lo && ie.ts_min <= hi).collect();
        let mut packets = Vec::with_capacity(candidates.len());
        for ie in candidates {
            packets.push(self.reader.read_packet_at(ie.offset, ie.entry_count)?);
        }
        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_writer::LogWriter;
    use btelem_proto::{build_packet, Endian, FieldDef, Schema, SchemaEntry};
    use std::io::Cursor;

    fn sensor_schema() -> Schema {
        let value = FieldDef::new("value", 0, 4, btelem_proto::BtelemType::F32, 1);
        let entry = SchemaEntry::new(7, "sensor", 4, vec![value]);
        Schema::new(vec![entry], Endian::Little)
    }

    fn build_file(packets: &[Vec<(u16, u64, Vec<u8>)>]) -> Vec<u8> {
        let schema = sensor_schema();
        let mut buf = Vec::new();
        let mut writer = LogWriter::create(&mut buf, &schema).expect("create");
        for entries in packets {
            let pkt = build_packet(entries, PacketHeaderVersion::V1);
            writer.write_packet(&pkt).expect("write");
        }
        writer.close().expect("close");
        buf
    }

    #[test]
    fn scenario_7_capture_exactness() {
        let file = build_file(&[
            vec![(7, 1000, 1.0f32.to_le_bytes().to_vec()), (7, 1100, 2.0f32.to_le_bytes().to_vec())],
            vec![(7, 2000, 3.0f32.to_le_bytes().to_vec())],
        ]);
        let mut capture = Capture::open(Cursor::new(file), PacketHeaderVersion::V1).expect("open");
        let (timestamps, values) = capture.series("sensor", "value", None, None).expect("series");
        let counts = capture.entry_counts().expect("counts");
        assert_eq!(timestamps.len(), counts["sensor"] as usize);
        assert!(matches!(values, Column::F32(_)));
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn unknown_channel_name_is_an_error() {
        let file = build_file(&[vec![(7, 1000, 1.0f32.to_le_bytes().to_vec())]]);
        let mut capture = Capture::open(Cursor::new(file), PacketHeaderVersion::V1).expect("open");
        let err = capture.series("nope", "value", None, None).unwrap_err();
        assert!(matches!(err, CoreError::UnknownChannel { .. }));
    }

    #[test]
    fn empty_result_has_zero_length_correctly_typed_column() {
        let file = build_file(&[vec![(7, 1000, 1.0f32.to_le_bytes().to_vec())]]);
        let mut capture = Capture::open(Cursor::new(file), PacketHeaderVersion::V1).expect("open");
        let (timestamps, values) = capture.series("sensor", "value", Some(5_000_000), Some(6_000_000)).expect("series");
        assert!(timestamps.is_empty());
        assert!(matches!(values, Column::F32(_)));
        assert!(values.is_empty());
    }

    #[test]
    fn table_extracts_timestamp_and_every_field_together() {
        let file = build_file(&[vec![(7, 1000, 1.0f32.to_le_bytes().to_vec())]]);
        let mut capture = Capture::open(Cursor::new(file), PacketHeaderVersion::V1).expect("open");
        let table = capture.table("sensor", None, None).expect("table");
        assert_eq!(table["_timestamp"], Column::U64(vec![1000]));
        assert_eq!(table["value"], Column::F32(vec![1.0]));
    }
}
