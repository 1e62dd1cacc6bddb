//! Append-only log file writer.

use std::io::Write;

use btelem_proto::{PacketHeaderVersion, Schema};

use crate::error::Result;
use crate::index::{packet_stats, IndexEntry, FILE_HEADER_SIZE, FILE_MAGIC, FILE_VERSION, FOOTER_MAGIC};

/// Writes a log file: header, appended packets, and a footer index built up
/// in memory as packets are written and flushed on close.
///
/// Closure is idempotent; dropping an unclosed writer attempts a best-effort
/// close (matching a normal process exit). An abrupt process termination
/// (panic during unwind, kill signal) leaves the file without a footer,
/// which is a supported state — see [`crate::log_reader::LogReader`].
pub struct LogWriter<W: Write> {
    file: W,
    header_version: PacketHeaderVersion,
    index: Vec<IndexEntry>,
    offset: u64,
    closed: bool,
}

impl<W: Write> LogWriter<W> {
    /// Create a new log file, writing the fixed header and schema blob.
    pub fn create(mut file: W, schema: &Schema) -> Result<Self> {
        let schema_blob = schema.to_bytes();
        let mut header = Vec::with_capacity(FILE_HEADER_SIZE + schema_blob.len());
        header.extend_from_slice(FILE_MAGIC);
        header.extend_from_slice(&FILE_VERSION.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        header.extend_from_slice(&(schema_blob.len() as u32).to_le_bytes());
        header.extend_from_slice(&schema_blob);
        file.write_all(&header)?;

        #[allow(clippy::cast_possible_truncation)]
        let offset = header.len() as u64;
        Ok(Self { file, header_version: PacketHeaderVersion::V1, index: Vec::new(), offset, closed: false })
    }

    /// Select the packet header version this writer's packets use.
    #[must_use]
    pub fn with_header_version(mut self, version: PacketHeaderVersion) -> Self {
        self.header_version = version;
        self
    }

    /// Append one already-encoded packet (e.g. from [`btelem_proto::build_packet`]).
    ///
    /// `ts_min`/`ts_max` are derived by scanning the packet's entry headers;
    /// `entry_count` is read straight from the packet's own header field, so
    /// a malformed packet whose declared count overruns the buffer still
    /// gets that count persisted into the index. The payload bytes
    /// themselves are never inspected.
    pub fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        let (ts_min, ts_max, entry_count) = packet_stats(packet, self.header_version);
        self.file.write_all(packet)?;
        self.index.push(IndexEntry { offset: self.offset, ts_min, ts_max, entry_count });
        #[allow(clippy::cast_possible_truncation)]
        {
            self.offset += packet.len() as u64;
        }
        Ok(())
    }

    /// Number of packets written so far.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.index.len()
    }

    /// Flush the index and footer, finalizing the file. Safe to call more
    /// than once.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let index_offset = self.offset;
        for entry in &self.index {
            self.file.write_all(&entry.to_bytes())?;
        }

        let mut footer = [0u8; 16];
        footer[0..8].copy_from_slice(&index_offset.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let count = self.index.len() as u32;
        footer[8..12].copy_from_slice(&count.to_le_bytes());
        footer[12..16].copy_from_slice(&FOOTER_MAGIC.to_le_bytes());
        self.file.write_all(&footer)?;
        self.file.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl<W: Write> Drop for LogWriter<W> {
    fn drop(&mut self) {
        if !self.closed && !std::thread::panicking() {
            let _ = self.close_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btelem_proto::{build_packet, Endian, FieldDef, SchemaEntry};

    fn sensor_schema() -> Schema {
        let field = FieldDef::new("value", 0, 4, btelem_proto::BtelemType::F32, 1);
        let entry = SchemaEntry::new(7, "sensor", 4, vec![field]);
        Schema::new(vec![entry], Endian::Little)
    }

    #[test]
    fn close_writes_valid_footer_arithmetic() {
        let schema = sensor_schema();
        let mut buf = Vec::new();
        {
            let mut writer = LogWriter::create(&mut buf, &schema).expect("create");
            let pkt = build_packet(&[(7, 1000, 1.0f32.to_le_bytes().to_vec())], PacketHeaderVersion::V1);
            writer.write_packet(&pkt).expect("write");
            writer.close().expect("close");
        }
        let file_size = buf.len() as u64;
        let footer = &buf[buf.len() - 16..];
        let index_offset = u64::from_le_bytes(footer[0..8].try_into().unwrap());
        let count = u32::from_le_bytes(footer[8..12].try_into().unwrap());
        assert_eq!(index_offset + u64::from(count) * 28 + 16, file_size);
    }

    #[test]
    fn drop_without_explicit_close_still_finalizes() {
        let schema = sensor_schema();
        let mut buf = Vec::new();
        {
            let mut writer = LogWriter::create(&mut buf, &schema).expect("create");
            let pkt = build_packet(&[(7, 1000, 1.0f32.to_le_bytes().to_vec())], PacketHeaderVersion::V1);
            writer.write_packet(&pkt).expect("write");
        }
        let footer = &buf[buf.len() - 16..];
        let magic = u32::from_le_bytes(footer[12..16].try_into().unwrap());
        assert_eq!(magic, FOOTER_MAGIC);
    }
}
