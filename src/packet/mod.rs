//! MySQL packet transport
//!
//! This module frames and deframes the MySQL protocol packet stream.
//! Every packet on the wire is one or more frames of the shape
//! `len[0] len[1] len[2] seq`: a 24-bit little-endian payload length
//! followed by an 8-bit sequence number. Logical packets longer than
//! [`MAX_PAYLOAD_LEN`] are split into successive max-size frames plus a
//! final (possibly empty) frame; the sequence number advances by exactly
//! one per frame in each direction, independent of logical-packet
//! boundaries.
//!
//! # Architecture
//!
//! - [`Stream`] abstracts the raw transport (plain TCP or TLS) so the
//!   handshake layer can swap plaintext for an encrypted stream mid-flight.
//! - [`Conn`] owns the sequence counter, the optional buffered reader and
//!   the framing logic.
//! - [`PacketDump`] is an injected diagnostic sink that records a hex dump
//!   of every logical packet read or written.
//!
//! Nothing at this layer retries or resynchronizes: any framing violation
//! or short read/write is fatal and the caller is expected to close the
//! connection.

pub mod conn;
pub mod dump;
pub mod stream;

pub use conn::Conn;
pub use dump::PacketDump;
pub use stream::Stream;

/// Result type for packet transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum payload carried by a single frame (2^24 - 1 bytes)
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FFFF;

/// Size of the frame header: 3 length bytes plus the sequence byte
pub const HEADER_SIZE: usize = 4;

/// Packet transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Short read/write or any other transport-level I/O failure
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Frame header carried a payload length below the protocol minimum
    #[error("invalid payload length {0}")]
    InvalidPayloadLength(usize),

    /// Frame sequence number did not match the expected value
    #[error("invalid sequence {got} != {expected}")]
    BadSequence { got: u8, expected: u8 },

    /// Buffered reading may only be enabled once per connection
    #[error("read buffer already enabled")]
    BufferAlreadyEnabled,

    /// The transport cannot be swapped once buffered reading is installed,
    /// since bytes already buffered would be silently dropped
    #[error("cannot replace transport after buffering is enabled")]
    BufferedTransportSwap,
}
