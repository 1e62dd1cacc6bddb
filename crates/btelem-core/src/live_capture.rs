//! Live rolling accumulator: a bounded ring of packet buffers fed directly
//! from a transport, with the same column-extraction contract as the
//! file-backed [`crate::capture::Capture`].

use std::collections::{HashMap, VecDeque};

use btelem_proto::PacketHeaderVersion;

use crate::column::{Column, ColumnBuilder};
use crate::error::{CoreError, Result};
use crate::index::{packet_stats, scan_packet_entries};

/// Tunables for [`LiveCapture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveCaptureConfig {
    /// Maximum number of packets the ring retains before evicting the oldest.
    pub max_packets: usize,
    /// Packet header version incoming packets use.
    pub header_version: PacketHeaderVersion,
    /// Largest `add_stream` length prefix accepted before the input buffer
    /// is treated as desynchronized and discarded wholesale.
    pub max_packet_size: u32,
}

impl Default for LiveCaptureConfig {
    fn default() -> Self {
        Self { max_packets: 4096, header_version: PacketHeaderVersion::V1, max_packet_size: 1024 * 1024 }
    }
}

struct RingSlot {
    bytes: Vec<u8>,
    ts_min: u64,
    ts_max: u64,
    entry_count: u32,
}

/// Bounded ring of recently-seen packets, queryable the same way as a
/// closed log file.
pub struct LiveCapture {
    schema: btelem_proto::Schema,
    config: LiveCaptureConfig,
    ring: VecDeque<RingSlot>,
    truncated_packets: u64,
    truncated_entries: u64,
}

impl LiveCapture {
    /// Build a live capture over `schema` with the default configuration.
    #[must_use]
    pub fn new(schema: btelem_proto::Schema) -> Self {
        Self::with_config(schema, LiveCaptureConfig::default())
    }

    /// Build a live capture with an explicit configuration.
    #[must_use]
    pub fn with_config(schema: btelem_proto::Schema, config: LiveCaptureConfig) -> Self {
        Self { schema, config, ring: VecDeque::new(), truncated_packets: 0, truncated_entries: 0 }
    }

    /// Number of packets discarded so far to stay within `max_packets`.
    #[must_use]
    pub fn truncated_packets(&self) -> u64 {
        self.truncated_packets
    }

    /// Number of entries discarded so far through packet eviction.
    #[must_use]
    pub fn truncated_entries(&self) -> u64 {
        self.truncated_entries
    }

    /// Drop every buffered packet and reset the truncation counters.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.truncated_packets = 0;
        self.truncated_entries = 0;
    }

    /// Copy `packet` into the ring, evicting the oldest packet if full.
    pub fn add_packet(&mut self, packet: &[u8]) {
        let (ts_min, ts_max, entry_count) = packet_stats(packet, self.config.header_version);
        self.ring.push_back(RingSlot { bytes: packet.to_vec(), ts_min, ts_max, entry_count });
        if self.ring.len() > self.config.max_packets
            && let Some(evicted) = self.ring.pop_front()
        {
            self.truncated_packets += 1;
            self.truncated_entries += u64::from(evicted.entry_count);
        }
    }

    /// Consume as many complete length-prefixed frames from `buffer` as it
    /// holds, bounded by `max_pending` packets per call, and return the
    /// number of bytes consumed so the caller can splice them out of its
    /// own buffer.
    ///
    /// A length prefix exceeding the configured maximum desynchronizes the
    /// stream: every byte of `buffer` is reported consumed (the caller
    /// should drop it all), matching the stream framer's resync rule.
    pub fn add_stream(&mut self, buffer: &[u8], max_pending: usize) -> usize {
        let mut consumed = 0usize;
        let mut processed = 0usize;

        while processed < max_pending {
            let remaining = &buffer[consumed..];
            if remaining.len() < 4 {
                break;
            }
            let len = u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]);
            if len > self.config.max_packet_size {
                tracing::warn!(len, max = self.config.max_packet_size, "oversized packet in live stream, discarding buffer");
                return buffer.len();
            }
            let len = len as usize;
            if remaining.len() < 4 + len {
                break;
            }
            self.add_packet(&remaining[4..4 + len]);
            consumed += 4 + len;
            processed += 1;
        }

        consumed
    }

    /// Minimum and maximum timestamp currently held in the ring.
    #[must_use]
    pub fn time_range(&self) -> Option<(u64, u64)> {
        if self.ring.is_empty() {
            return None;
        }
        let t_min = self.ring.iter().map(|s| s.ts_min).min().unwrap_or(0);
        let t_max = self.ring.iter().map(|s| s.ts_max).max().unwrap_or(0);
        Some((t_min, t_max))
    }

    /// Total entries currently held in the ring, per schema entry name.
    #[must_use]
    pub fn entry_counts(&self) -> HashMap<String, u64> {
        let id_to_name: HashMap<u16, String> =
            self.schema.entries().iter().map(|e| (e.id, e.name.clone())).collect();
        let mut counts = HashMap::new();
        for slot in &self.ring {
            for scanned in scan_packet_entries(&slot.bytes, self.config.header_version) {
                if let Some(name) = id_to_name.get(&scanned.header.id()) {
                    *counts.entry(name.clone()).or_insert(0u64) += 1;
                }
            }
        }
        counts
    }

    /// Extract `(timestamps, values)` for one field of one entry from the
    /// ring's current contents, using the same two-pass exact-count
    /// algorithm as the file-backed capture. Concurrent mutation of the
    /// ring during a query is the caller's responsibility to avoid.
    pub fn series(
        &self,
        entry_name: &str,
        field_name: &str,
        t0: Option<u64>,
        t1: Option<u64>,
    ) -> Result<(Vec<u64>, Column)> {
        let entry = self
            .schema
            .entry_by_name(entry_name)
            .ok_or_else(|| CoreError::UnknownChannel { entry: entry_name.to_string(), field: None })?;
        let field = entry
            .fields
            .iter()
            .find(|f| f.name == field_name)
            .ok_or_else(|| CoreError::UnknownChannel {
                entry: entry_name.to_string(),
                field: Some(field_name.to_string()),
            })?;
        let lo = t0.unwrap_or(0);
        let hi = t1.unwrap_or(u64::MAX);

        let mut count = 0usize;
        for slot in &self.ring {
            for scanned in scan_packet_entries(&slot.bytes, self.config.header_version) {
                if scanned.header.id() == entry.id {
                    let ts = scanned.header.timestamp();
                    if ts >= lo && ts <= hi {
                        count += 1;
                    }
                }
            }
        }

        let mut timestamps = Vec::with_capacity(count);
        let mut builder = ColumnBuilder::for_field(field, count);
        for slot in &self.ring {
            for scanned in scan_packet_entries(&slot.bytes, self.config.header_version) {
                if scanned.header.id() != entry.id {
                    continue;
                }
                let ts = scanned.header.timestamp();
                if ts < lo || ts > hi {
                    continue;
                }
                let slice = &slot.bytes[scanned.payload_start..scanned.payload_end];
                let decoded = self.schema.decode_fields(entry, slice);
                if let Some((_, value)) = decoded.into_iter().find(|(n, _)| n == field_name) {
                    timestamps.push(ts);
                    builder.push(value);
                }
            }
        }

        Ok((timestamps, builder.finish()))
    }

    /// Extract every field of one entry from the ring's current contents
    /// in a single pass, keyed by field name, plus a `"_timestamp"` column.
    pub fn table(&self, entry_name: &str, t0: Option<u64>, t1: Option<u64>) -> Result<HashMap<String, Column>> {
        let entry = self
            .schema
            .entry_by_name(entry_name)
            .ok_or_else(|| CoreError::UnknownChannel { entry: entry_name.to_string(), field: None })?;
        let lo = t0.unwrap_or(0);
        let hi = t1.unwrap_or(u64::MAX);

        let mut count = 0usize;
        for slot in &self.ring {
            for scanned in scan_packet_entries(&slot.bytes, self.config.header_version) {
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

        for slot in &self.ring {
            for scanned in scan_packet_entries(&slot.bytes, self.config.header_version) {
                if scanned.header.id() != entry.id {
                    continue;
                }
                let ts = scanned.header.timestamp();
                if ts < lo || ts > hi {
                    continue;
                }
                let slice = &slot.bytes[scanned.payload_start..scanned.payload_end];
                let decoded = self.schema.decode_fields(entry, slice);
                timestamps.push(ts);
                for (name, value) in decoded {
                    if let Some(b) = builders.get_mut(&name) {
                        b.push(value);
                    }
                }
            }
        }

        let mut out: HashMap<String, Column> =
            builders.into_iter().map(|(name, builder)| (name, builder.finish())).collect();
        out.insert("_timestamp".to_string(), Column::U64(timestamps));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btelem_proto::{build_packet, frame_packet, Endian, FieldDef, Schema, SchemaEntry};

    fn ten_entry_schema() -> Schema {
        let value = FieldDef::new("value", 0, 4, btelem_proto::BtelemType::U32, 1);
        let entry = SchemaEntry::new(1, "counter", 4, vec![value]);
        Schema::new(vec![entry], Endian::Little)
    }

    fn packet_with_n_entries(n: u64) -> Vec<u8> {
        let entries: Vec<_> = (0..n).map(|i| (1u16, i, (i as u32).to_le_bytes().to_vec())).collect();
        build_packet(&entries, PacketHeaderVersion::V1)
    }

    #[test]
    fn scenario_e_live_rolling_window() {
        let schema = ten_entry_schema();
        let config = LiveCaptureConfig { max_packets: 3, ..LiveCaptureConfig::default() };
        let mut live = LiveCapture::with_config(schema, config);

        for _ in 0..4 {
            live.add_packet(&packet_with_n_entries(10));
        }

        let (timestamps, _) = live.series("counter", "value", None, None).expect("series");
        assert_eq!(timestamps.len(), 30);
        assert_eq!(live.truncated_packets(), 1);
        assert_eq!(live.truncated_entries(), 10);
    }

    #[test]
    fn add_stream_consumes_only_complete_frames() {
        let schema = ten_entry_schema();
        let mut live = LiveCapture::new(schema);
        let pkt = packet_with_n_entries(1);
        let framed = frame_packet(&pkt);

        let consumed = live.add_stream(&framed[..framed.len() - 1], 10);
        assert_eq!(consumed, 0);

        let consumed = live.add_stream(&framed, 10);
        assert_eq!(consumed, framed.len());
        assert_eq!(live.entry_counts()["counter"], 1);
    }

    #[test]
    fn add_stream_respects_max_pending_backpressure() {
        let schema = ten_entry_schema();
        let mut live = LiveCapture::new(schema);
        let mut stream = Vec::new();
        for _ in 0..5 {
            stream.extend_from_slice(&frame_packet(&packet_with_n_entries(1)));
        }

        let consumed = live.add_stream(&stream, 2);
        assert_eq!(live.entry_counts()["counter"], 2);
        assert!(consumed < stream.len());
    }

    #[test]
    fn clear_resets_ring_and_counters() {
        let schema = ten_entry_schema();
        let config = LiveCaptureConfig { max_packets: 1, ..LiveCaptureConfig::default() };
        let mut live = LiveCapture::with_config(schema, config);
        live.add_packet(&packet_with_n_entries(1));
        live.add_packet(&packet_with_n_entries(1));
        assert_eq!(live.truncated_packets(), 1);
        live.clear();
        assert_eq!(live.truncated_packets(), 0);
        assert_eq!(live.time_range(), None);
    }
}
