//! Log file reader: footer-indexed seek with a sequential-scan fallback.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};

use btelem_proto::{decode_packet, DecodedEntry, PacketHeaderVersion, Schema};

use crate::error::{CoreError, Result};
use crate::index::{
    header_declared_entry_count, scan_packet_entries, IndexEntry, FILE_HEADER_SIZE, FILE_MAGIC, FOOTER_MAGIC,
    FOOTER_SIZE, INDEX_ENTRY_SIZE,
};

/// Reads a log file written by [`crate::log_writer::LogWriter`].
///
/// Validates the header eagerly on open; the footer index is read if
/// present and internally consistent, otherwise every query falls back to
/// a sequential scan from `data_start`.
pub struct LogReader<R: Read + Seek> {
    file: R,
    schema: Schema,
    header_version: PacketHeaderVersion,
    data_start: u64,
    data_end: Option<u64>,
    index: Option<Vec<IndexEntry>>,
}

impl<R: Read + Seek> LogReader<R> {
    /// Open a log file, validating its header and parsing its schema.
    pub fn open(mut file: R, header_version: PacketHeaderVersion) -> Result<Self> {
        let mut header = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut header)?;
        if &header[0..4] != FILE_MAGIC {
            let found = u32::from_le_bytes(header[0..4].try_into().unwrap_or_default());
            let expected = u32::from_le_bytes(*FILE_MAGIC);
            return Err(CoreError::Proto(btelem_proto::ProtoError::BadMagic { expected, found }));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != crate::index::FILE_VERSION {
            return Err(CoreError::Proto(btelem_proto::ProtoError::UnsupportedVersion { found: version }));
        }
        let schema_len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
        let mut schema_buf = vec![0u8; schema_len];
        file.read_exact(&mut schema_buf)?;
        let schema = Schema::from_bytes(&schema_buf)?;

        let data_start = u64::try_from(FILE_HEADER_SIZE + schema_len).unwrap_or(0);
        let file_size = file.seek(SeekFrom::End(0))?;

        let (index, data_end) = Self::try_read_footer(&mut file, file_size).unwrap_or_else(|| {
            tracing::warn!("log file footer missing or corrupt, falling back to sequential scan");
            (None, None)
        });

        file.seek(SeekFrom::Start(data_start))?;
        Ok(Self { file, schema, header_version, data_start, data_end, index })
    }

    fn try_read_footer(file: &mut R, file_size: u64) -> Option<(Option<Vec<IndexEntry>>, Option<u64>)> {
        if file_size < FOOTER_SIZE as u64 {
            return None;
        }
        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE as u64)).ok()?;
        let mut footer = [0u8; FOOTER_SIZE];
        file.read_exact(&mut footer).ok()?;
        let index_offset = u64::from_le_bytes(footer[0..8].try_into().ok()?);
        let count = u32::from_le_bytes(footer[8..12].try_into().ok()?);
        let magic = u32::from_le_bytes(footer[12..16].try_into().ok()?);
        if magic != FOOTER_MAGIC {
            return None;
        }
        if index_offset + u64::from(count) * INDEX_ENTRY_SIZE as u64 + FOOTER_SIZE as u64 != file_size {
            return None;
        }

        file.seek(SeekFrom::Start(index_offset)).ok()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut buf = [0u8; INDEX_ENTRY_SIZE];
            file.read_exact(&mut buf).ok()?;
            entries.push(IndexEntry::from_bytes(&buf));
        }
        Some((Some(entries), Some(index_offset)))
    }

    /// Schema this file was written against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Footer index, if present and valid.
    #[must_use]
    pub fn index(&self) -> Option<&[IndexEntry]> {
        self.index.as_deref()
    }

    /// Packet header version this reader decodes with.
    #[must_use]
    pub fn header_version(&self) -> PacketHeaderVersion {
        self.header_version
    }

    /// Decode every entry in range, honoring the footer index when present.
    ///
    /// Time bounds are inclusive. A packet may straddle a bound: the index
    /// path only uses `(ts_min, ts_max)` to decide whether to *read* a
    /// packet at all, then filters individual entries by timestamp after
    /// decoding.
    pub fn entries(
        &mut self,
        t0: Option<u64>,
        t1: Option<u64>,
        filter_ids: Option<&HashSet<u16>>,
    ) -> Result<Vec<DecodedEntry>> {
        let lo = t0.unwrap_or(0);
        let hi = t1.unwrap_or(u64::MAX);

        if self.index.is_some() && (t0.is_some() || t1.is_some()) {
            self.entries_indexed(lo, hi, filter_ids)
        } else {
            self.entries_sequential(lo, hi, filter_ids)
        }
    }

    fn entries_indexed(&mut self, lo: u64, hi: u64, filter_ids: Option<&HashSet<u16>>) -> Result<Vec<DecodedEntry>> {
        let index = self.index.clone().unwrap_or_default();
        let mut out = Vec::new();
        for ie in &index {
            if ie.ts_max < lo || ie.ts_min > hi {
                continue;
            }
            let packet = self.read_packet_at(ie.offset, ie.entry_count)?;
            let result = decode_packet(&self.schema, &packet, filter_ids, self.header_version);
            out.extend(result.entries.into_iter().filter(|e| e.timestamp >= lo && e.timestamp <= hi));
        }
        Ok(out)
    }

    fn entries_sequential(&mut self, lo: u64, hi: u64, filter_ids: Option<&HashSet<u16>>) -> Result<Vec<DecodedEntry>> {
        self.file.seek(SeekFrom::Start(self.data_start))?;
        let mut out = Vec::new();
        loop {
            let pos = self.file.stream_position()?;
            if let Some(end) = self.data_end {
                if pos >= end {
                    break;
                }
            }
            let header_size = self.header_version.header_size();
            let mut header_buf = vec![0u8; header_size];
            if self.file.read_exact(&mut header_buf).is_err() {
                break;
            }
            let Ok(fields) = self.header_version.parse(&header_buf) else { break };
            let body_len = usize::from(fields.entry_count) * btelem_proto::ENTRY_HEADER_SIZE + fields.payload_size as usize;
            let mut body = vec![0u8; body_len];
            if self.file.read_exact(&mut body).is_err() {
                break;
            }
            let mut packet = header_buf;
            packet.extend_from_slice(&body);

            let result = decode_packet(&self.schema, &packet, filter_ids, self.header_version);
            out.extend(result.entries.into_iter().filter(|e| e.timestamp >= lo && e.timestamp <= hi));
        }
        Ok(out)
    }

    pub(crate) fn read_packet_at(&mut self, offset: u64, entry_count: u32) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let header_size = self.header_version.header_size();
        let mut header_buf = vec![0u8; header_size];
        self.file.read_exact(&mut header_buf)?;
        let fields = self.header_version.parse(&header_buf)?;
        let body_len = usize::from(fields.entry_count).max(entry_count as usize) * btelem_proto::ENTRY_HEADER_SIZE
            + fields.payload_size as usize;
        let mut body = vec![0u8; body_len];
        self.file.read_exact(&mut body)?;
        let mut packet = header_buf;
        packet.extend_from_slice(&body);
        Ok(packet)
    }

    /// Re-scan the whole file header-first to rebuild an index, used when
    /// the footer was missing or corrupt. Does not mutate `self`; callers
    /// decide whether to install the result.
    pub fn rebuild_index_by_scan(&mut self) -> Result<Vec<IndexEntry>> {
        self.file.seek(SeekFrom::Start(self.data_start))?;
        let mut out = Vec::new();
        loop {
            let offset = self.file.stream_position()?;
            let header_size = self.header_version.header_size();
            let mut header_buf = vec![0u8; header_size];
            if self.file.read_exact(&mut header_buf).is_err() {
                break;
            }
            let Ok(fields) = self.header_version.parse(&header_buf) else { break };
            let body_len = usize::from(fields.entry_count) * btelem_proto::ENTRY_HEADER_SIZE + fields.payload_size as usize;
            let mut body = vec![0u8; body_len];
            if self.file.read_exact(&mut body).is_err() {
                break;
            }
            let mut packet = header_buf;
            packet.extend_from_slice(&body);
            let scanned = scan_packet_entries(&packet, self.header_version);
            let ts_min = scanned.iter().map(|e| e.header.timestamp()).min().unwrap_or(0);
            let ts_max = scanned.iter().map(|e| e.header.timestamp()).max().unwrap_or(0);
            let entry_count = header_declared_entry_count(&packet, self.header_version);
            out.push(IndexEntry { offset, ts_min, ts_max, entry_count });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_writer::LogWriter;
    use btelem_proto::{build_packet, Endian, FieldDef, SchemaEntry};
    use std::io::Cursor;

    fn two_field_schema() -> Schema {
        let value = FieldDef::new("value", 0, 4, btelem_proto::BtelemType::F32, 1);
        let entry = SchemaEntry::new(7, "sensor", 4, vec![value]);
        Schema::new(vec![entry], Endian::Little)
    }

    fn write_three_packets() -> Vec<u8> {
        let schema = two_field_schema();
        let mut buf = Vec::new();
        let mut writer = LogWriter::create(&mut buf, &schema).expect("create");
        for (t0, t1) in [(1000u64, 2000u64), (5000, 6000), (9000, 10000)] {
            let pkt = build_packet(
                &[(7, t0, 1.0f32.to_le_bytes().to_vec()), (7, t1, 2.0f32.to_le_bytes().to_vec())],
                PacketHeaderVersion::V1,
            );
            writer.write_packet(&pkt).expect("write");
        }
        writer.close().expect("close");
        buf
    }

    #[test]
    fn scenario_c_log_time_range() {
        let buf = write_three_packets();
        let mut reader = LogReader::open(Cursor::new(buf), PacketHeaderVersion::V1).expect("open");
        assert!(reader.index().is_some());
        let entries = reader.entries(Some(4000), Some(7000), None).expect("query");
        let mut timestamps: Vec<u64> = entries.iter().map(|e| e.timestamp).collect();
        timestamps.sort_unstable();
        assert_eq!(timestamps, vec![5000, 6000]);
    }

    #[test]
    fn sequential_fallback_when_footer_absent() {
        let schema = two_field_schema();
        let mut buf = Vec::new();
        let mut writer = LogWriter::create(&mut buf, &schema).expect("create");
        let pkt = build_packet(&[(7, 1000, 1.0f32.to_le_bytes().to_vec())], PacketHeaderVersion::V1);
        writer.write_packet(&pkt).expect("write");
        // Deliberately do not close: no footer is written.
        std::mem::forget(writer);

        let mut reader = LogReader::open(Cursor::new(buf), PacketHeaderVersion::V1).expect("open");
        assert!(reader.index().is_none());
        let entries = reader.entries(None, None, None).expect("sequential query");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = write_three_packets();
        buf[0] = b'X';
        let err = LogReader::open(Cursor::new(buf), PacketHeaderVersion::V1).unwrap_err();
        assert!(matches!(err, CoreError::Proto(btelem_proto::ProtoError::BadMagic { .. })));
    }
}
