//! Transport stream abstraction
//!
//! The handshake may upgrade a plaintext connection to TLS in place, so the
//! transport is an enum rather than a generic parameter: the concrete
//! `TcpStream` has to be moved out of the connection, handed to OpenSSL and
//! replaced by the resulting encrypted stream. `Closed` is the placeholder
//! left behind while that swap is in progress and after shutdown.

use openssl::ssl::SslStream;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// Raw byte-stream transport underneath a packet connection
pub enum Stream {
    /// Plain TCP transport
    Tcp(TcpStream),
    /// TLS transport established by the mid-handshake upgrade
    Tls(Box<SslStream<TcpStream>>),
    /// No transport attached (mid-upgrade placeholder, or shut down)
    Closed,
}

impl Stream {
    /// Whether the transport is already encrypted
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Stream::Tls(_))
    }

    /// Remote address of the peer
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Stream::Tcp(s) => s.peer_addr(),
            Stream::Tls(s) => s.get_ref().peer_addr(),
            Stream::Closed => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream is closed",
            )),
        }
    }

    /// Shut the transport down in both directions
    ///
    /// For TLS this sends the close-notify alert before shutting down the
    /// underlying socket.
    pub fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            Stream::Tls(s) => {
                let _ = s.shutdown();
                s.get_ref().shutdown(Shutdown::Both)
            }
            Stream::Closed => Ok(()),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
            Stream::Closed => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream is closed",
            )),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
            Stream::Closed => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream is closed",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
            Stream::Closed => Ok(()),
        }
    }
}

impl From<TcpStream> for Stream {
    fn from(stream: TcpStream) -> Self {
        Stream::Tcp(stream)
    }
}

impl From<SslStream<TcpStream>> for Stream {
    fn from(stream: SslStream<TcpStream>) -> Self {
        Stream::Tls(Box::new(stream))
    }
}
