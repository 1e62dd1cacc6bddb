//! Stateful length-prefixed stream reassembly.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::BytesMut;

use crate::header::PacketHeaderVersion;
use crate::packet::{decode_packet, DecodedEntry};
use crate::schema::Schema;

/// Tunable limits for [`StreamFramer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerConfig {
    /// Largest length prefix the framer accepts before resynchronizing.
    ///
    /// The wire has no framing escape besides the length prefix itself, so
    /// a length this large (or larger) is treated as stream corruption:
    /// the entire buffer is discarded and accumulation resumes from
    /// whatever bytes arrive next.
    pub max_packet_size: u32,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self { max_packet_size: 1024 * 1024 }
    }
}

/// Owns a growable receive buffer and turns a byte stream into decoded
/// packets, tracking a running drop total across the stream's lifetime.
pub struct StreamFramer {
    buffer: BytesMut,
    schema: Arc<Schema>,
    header_version: PacketHeaderVersion,
    config: FramerConfig,
    filter_ids: Option<HashSet<u16>>,
    dropped_total: u64,
}

impl StreamFramer {
    /// Build a framer for `schema`, using the default [`FramerConfig`].
    #[must_use]
    pub fn new(schema: Arc<Schema>, header_version: PacketHeaderVersion) -> Self {
        Self::with_config(schema, header_version, FramerConfig::default())
    }

    /// Build a framer with an explicit configuration.
    #[must_use]
    pub fn with_config(schema: Arc<Schema>, header_version: PacketHeaderVersion, config: FramerConfig) -> Self {
        Self { buffer: BytesMut::new(), schema, header_version, config, filter_ids: None, dropped_total: 0 }
    }

    /// Restrict decoding to the given entry ids. Entries outside the set
    /// are skipped during decode without their payload being read.
    pub fn set_filter_ids(&mut self, filter_ids: Option<HashSet<u16>>) {
        self.filter_ids = filter_ids;
    }

    /// Total `dropped` accumulated across every packet decoded so far,
    /// including packets discarded wholesale by a resync event.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// Number of bytes currently buffered, awaiting a complete frame.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append `bytes` to the receive buffer and decode every complete
    /// frame now available, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedEntry> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            if self.buffer.len() < 4 {
                break;
            }
            let len = u32::from_le_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]]);

            if len > self.config.max_packet_size {
                tracing::warn!(
                    len,
                    max = self.config.max_packet_size,
                    "oversized packet length prefix, resynchronizing stream"
                );
                self.buffer.clear();
                break;
            }

            let len = len as usize;
            if self.buffer.len() < 4 + len {
                break;
            }

            let frame = self.buffer.split_to(4 + len);
            let result = decode_packet(&self.schema, &frame[4..], self.filter_ids.as_ref(), self.header_version);
            self.dropped_total += u64::from(result.dropped);
            out.extend(result.entries);
        }

        out
    }
}

/// Prefix `packet` with its `u32_le` length, as the wire framing requires.
#[must_use]
pub fn frame_packet(packet: &[u8]) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let len = packet.len() as u32;
    let mut out = Vec::with_capacity(4 + packet.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(packet);
    out
}
