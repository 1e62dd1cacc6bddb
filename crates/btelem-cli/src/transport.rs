//! Concrete transport backends for `btelem live`.
//!
//! Grounded on the original implementation's `transport.py`: TCP (client
//! mode, blocking connect), UDP (bound locally, remote learned from the
//! first datagram received), and a deliberately unsupported serial backend
//! since no serial-port crate is part of this workspace's dependency stack.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use btelem_core::{CoreError, RecvExact, Result, Transport};

/// TCP stream transport (client mode), matching `TCPTransport` from the
/// original implementation.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `addr` with a fixed five-second handshake timeout.
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        match self.stream.read(&mut buf) {
            Ok(read) => {
                buf.truncate(read);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown(std::net::Shutdown::Both)
    }
}

impl RecvExact for TcpTransport {
    fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                CoreError::ConnectionClosed
            } else {
                CoreError::from(e)
            }
        })?;
        Ok(buf)
    }
}

/// UDP datagram transport, matching `UDPTransport` from the original
/// implementation: bound locally, remote peer learned from the first
/// datagram received.
pub struct UdpTransport {
    socket: UdpSocket,
    remote: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind a UDP socket on `bind_addr`.
    pub fn bind(bind_addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        Ok(Self { socket, remote: None })
    }
}

impl Transport for UdpTransport {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        match self.socket.recv_from(&mut buf) {
            Ok((read, from)) => {
                self.remote.get_or_insert(from);
                buf.truncate(read);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(remote) = self.remote {
            self.socket.send_to(data, remote)?;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
