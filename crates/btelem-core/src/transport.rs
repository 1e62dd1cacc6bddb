//! Transport capability traits consumed by the core.
//!
//! Stands in for the original class hierarchy of transport backends (TCP,
//! UDP, serial, file, in-memory): rather than one abstract base class, the
//! core only asks for the capabilities it actually uses. Concrete
//! transports (file, TCP) are a collaborator's concern — see `btelem-cli`.

use std::io;

use btelem_proto::Schema;

use crate::error::{CoreError, Result};

/// Blocking byte transport: read, write, close.
pub trait Transport {
    /// Read up to `n` bytes. An empty return means "no data right now",
    /// not end-of-stream.
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>>;

    /// Write `data` in full.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Release any held resources. Must be idempotent.
    fn close(&mut self) -> io::Result<()>;
}

/// A transport capable of blocking until exactly `n` bytes are available.
pub trait RecvExact {
    /// Read exactly `n` bytes, blocking as needed.
    ///
    /// # Errors
    /// Returns [`CoreError::ConnectionClosed`] if the peer closes before
    /// `n` bytes arrive, or [`CoreError::Io`] on any other transport
    /// failure.
    fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>>;
}

/// Read the `[u32_le schema_len][schema blob]` handshake a stream producer
/// sends before its indefinite packet stream, and parse the schema.
///
/// Generic over any [`RecvExact`] implementor rather than tied to TCP
/// specifically.
pub fn read_stream_schema<T: RecvExact + ?Sized>(transport: &mut T) -> Result<Schema> {
    let len_bytes = transport.recv_exact(4)?;
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    let schema_bytes = transport.recv_exact(len)?;
    Schema::from_bytes(&schema_bytes).map_err(CoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTransport {
        data: Vec<u8>,
        pos: usize,
    }

    impl RecvExact for FakeTransport {
        fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>> {
            if self.pos + n > self.data.len() {
                return Err(CoreError::ConnectionClosed);
            }
            let out = self.data[self.pos..self.pos + n].to_vec();
            self.pos += n;
            Ok(out)
        }
    }

    #[test]
    fn read_stream_schema_parses_handshake() {
        use btelem_proto::{Endian, FieldDef, Schema, SchemaEntry};
        let field = FieldDef::new("value", 0, 4, btelem_proto::BtelemType::F32, 1);
        let entry = SchemaEntry::new(7, "temp", 4, vec![field]);
        let schema = Schema::new(vec![entry], Endian::Little);
        let schema_bytes = schema.to_bytes();

        let mut handshake = (schema_bytes.len() as u32).to_le_bytes().to_vec();
        handshake.extend_from_slice(&schema_bytes);

        let mut transport = FakeTransport { data: handshake, pos: 0 };
        let parsed = read_stream_schema(&mut transport).expect("should parse handshake");
        assert_eq!(parsed, schema);
    }

    #[test]
    fn read_stream_schema_reports_connection_closed_on_short_handshake() {
        let mut transport = FakeTransport { data: vec![1, 2], pos: 0 };
        let err = read_stream_schema(&mut transport).unwrap_err();
        assert_eq!(err, CoreError::ConnectionClosed);
    }
}
