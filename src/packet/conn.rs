//! Packet connection
//!
//! [`Conn`] is the base object for speaking the MySQL packet protocol over
//! a byte stream. It owns the per-connection sequence counter, hides the
//! splitting of oversized logical packets into max-size frames, and
//! optionally installs a buffered reader once the transport is final
//! (i.e. after any TLS upgrade).

use super::dump::{Direction, PacketDump};
use super::stream::Stream;
use super::{Error, Result, HEADER_SIZE, MAX_PAYLOAD_LEN};
use bytes::BytesMut;
use std::io::{BufReader, Read, Write};
use std::net::SocketAddr;

/// Capacity of the optional buffered reader
const READ_BUFFER_SIZE: usize = 4096;

enum Io {
    Plain(Stream),
    Buffered(BufReader<Stream>),
}

/// A packet-framed protocol connection
pub struct Conn {
    io: Io,
    sequence: u8,
    dump: Option<PacketDump>,
}

impl Conn {
    /// Create a connection over a freshly established transport
    ///
    /// The sequence counter starts at zero.
    pub fn new(stream: impl Into<Stream>) -> Self {
        Conn {
            io: Io::Plain(stream.into()),
            sequence: 0,
            dump: None,
        }
    }

    /// Create a connection with a diagnostic dump sink attached
    pub fn with_dump(stream: impl Into<Stream>, dump: PacketDump) -> Self {
        Conn {
            io: Io::Plain(stream.into()),
            sequence: 0,
            dump: Some(dump),
        }
    }

    /// Current expected sequence number
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Set the expected sequence number
    ///
    /// Used by the handshake after a TLS upgrade, where one packet has
    /// already been exchanged in each direction in plaintext.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    /// Reset the expected sequence number to zero (logical session reset)
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    /// Whether the underlying transport is TLS
    pub fn is_encrypted(&self) -> bool {
        self.stream().is_encrypted()
    }

    /// Remote address of the peer
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream().peer_addr()
    }

    /// Install a buffered reader in front of the transport
    ///
    /// May be called at most once, and only after any TLS upgrade has
    /// completed: swapping the transport underneath an installed buffer
    /// would silently drop bytes already read ahead.
    pub fn enable_buffer(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.io, Io::Plain(Stream::Closed)) {
            Io::Buffered(reader) => {
                self.io = Io::Buffered(reader);
                Err(Error::BufferAlreadyEnabled)
            }
            Io::Plain(stream) => {
                self.io = Io::Buffered(BufReader::with_capacity(READ_BUFFER_SIZE, stream));
                Ok(())
            }
        }
    }

    /// Detach the transport, leaving [`Stream::Closed`] in its place
    ///
    /// Fails once buffering is enabled; the handshake uses this to hand the
    /// plaintext stream to the TLS layer.
    pub fn take_stream(&mut self) -> Result<Stream> {
        match std::mem::replace(&mut self.io, Io::Plain(Stream::Closed)) {
            Io::Plain(stream) => Ok(stream),
            Io::Buffered(reader) => {
                self.io = Io::Buffered(reader);
                Err(Error::BufferedTransportSwap)
            }
        }
    }

    /// Attach a new transport after [`Conn::take_stream`]
    ///
    /// The sequence counter is left untouched; the caller decides what the
    /// new transport's position in the exchange is.
    pub fn replace_stream(&mut self, stream: impl Into<Stream>) -> Result<()> {
        match &mut self.io {
            Io::Plain(slot) => {
                *slot = stream.into();
                Ok(())
            }
            Io::Buffered(_) => Err(Error::BufferedTransportSwap),
        }
    }

    /// Read one logical packet, reassembling split frames
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = BytesMut::new();
        let mut first = true;
        loop {
            let frame_len = self.read_frame_into(&mut payload, first)?;
            first = false;
            if frame_len < MAX_PAYLOAD_LEN {
                break;
            }
        }
        if let Some(dump) = &self.dump {
            dump.record(Direction::Read, self.sequence, &payload);
        }
        Ok(payload.to_vec())
    }

    /// Read a single frame and append its payload
    ///
    /// An empty frame is only legal as the terminator of an exact-multiple
    /// logical packet, never as the first frame.
    fn read_frame_into(&mut self, payload: &mut BytesMut, first: bool) -> Result<usize> {
        let mut header = [0u8; HEADER_SIZE];
        self.reader().read_exact(&mut header).map_err(Error::Connection)?;

        let length =
            usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
        if first && length < 1 {
            return Err(Error::InvalidPayloadLength(length));
        }

        let sequence = header[3];
        if sequence != self.sequence {
            return Err(Error::BadSequence {
                got: sequence,
                expected: self.sequence,
            });
        }
        self.sequence = self.sequence.wrapping_add(1);

        let start = payload.len();
        payload.resize(start + length, 0);
        self.reader()
            .read_exact(&mut payload[start..])
            .map_err(Error::Connection)?;
        Ok(length)
    }

    /// Write one logical packet, splitting into frames as needed
    ///
    /// The caller supplies the payload with its first [`HEADER_SIZE`] bytes
    /// reserved for header use; the buffer is stamped in place so no copy
    /// is made per frame. Buffers shorter than the header reserve are
    /// rejected.
    pub fn write_packet(&mut self, data: &mut [u8]) -> Result<()> {
        if data.len() < HEADER_SIZE {
            return Err(Error::InvalidPayloadLength(data.len()));
        }

        if let Some(dump) = &self.dump {
            dump.record(Direction::Write, self.sequence, data);
        }

        let mut offset = 0;
        let mut remaining = data.len() - HEADER_SIZE;

        while remaining >= MAX_PAYLOAD_LEN {
            data[offset] = 0xff;
            data[offset + 1] = 0xff;
            data[offset + 2] = 0xff;
            data[offset + 3] = self.sequence;

            let end = offset + HEADER_SIZE + MAX_PAYLOAD_LEN;
            self.stream_mut()
                .write_all(&data[offset..end])
                .map_err(Error::Connection)?;

            self.sequence = self.sequence.wrapping_add(1);
            remaining -= MAX_PAYLOAD_LEN;
            // the next header overwrites four already-transmitted bytes
            offset += MAX_PAYLOAD_LEN;
        }

        data[offset] = remaining as u8;
        data[offset + 1] = (remaining >> 8) as u8;
        data[offset + 2] = (remaining >> 16) as u8;
        data[offset + 3] = self.sequence;

        self.stream_mut()
            .write_all(&data[offset..])
            .map_err(Error::Connection)?;
        self.stream_mut().flush().map_err(Error::Connection)?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(())
    }

    /// Shut the connection down
    ///
    /// The sequence counter is reset so an accidentally reused connection
    /// fails on the first framing check instead of desynchronizing.
    pub fn close(&mut self) -> Result<()> {
        self.sequence = 0;
        self.stream_mut().shutdown().map_err(Error::Connection)?;
        self.io = Io::Plain(Stream::Closed);
        Ok(())
    }

    fn reader(&mut self) -> &mut dyn Read {
        match &mut self.io {
            Io::Plain(stream) => stream,
            Io::Buffered(reader) => reader,
        }
    }

    fn stream(&self) -> &Stream {
        match &self.io {
            Io::Plain(stream) => stream,
            Io::Buffered(reader) => reader.get_ref(),
        }
    }

    fn stream_mut(&mut self) -> &mut Stream {
        match &mut self.io {
            Io::Plain(stream) => stream,
            Io::Buffered(reader) => reader.get_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_small_packet_round_trip() {
        let (client, server) = tcp_pair();
        let mut writer = Conn::new(client);
        let mut reader = Conn::new(server);

        let mut data = vec![0u8; 4];
        data.extend_from_slice(b"hello");
        writer.write_packet(&mut data).unwrap();
        assert_eq!(writer.sequence(), 1);

        let payload = reader.read_packet().unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(reader.sequence(), 1);
    }

    #[test]
    fn test_sequence_mismatch_leaves_counter_unadvanced() {
        let (client, server) = tcp_pair();
        let mut writer = Conn::new(client);
        let mut reader = Conn::new(server);

        writer.set_sequence(5);
        let mut data = vec![0u8; 5];
        data[4] = 0xaa;
        writer.write_packet(&mut data).unwrap();

        let err = reader.read_packet().unwrap_err();
        match err {
            Error::BadSequence { got, expected } => {
                assert_eq!(got, 5);
                assert_eq!(expected, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reader.sequence(), 0);
    }

    #[test]
    fn test_zero_length_initial_frame_rejected() {
        let (client, server) = tcp_pair();
        let mut reader = Conn::new(server);

        let mut client = client;
        use std::io::Write as _;
        client.write_all(&[0, 0, 0, 0]).unwrap();

        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, Error::InvalidPayloadLength(0)));
    }

    #[test]
    fn test_sequence_wraps_to_zero() {
        let (client, server) = tcp_pair();
        let mut writer = Conn::new(client);
        let mut reader = Conn::new(server);

        writer.set_sequence(255);
        reader.set_sequence(255);

        let mut data = vec![0u8; 5];
        data[4] = 1;
        writer.write_packet(&mut data).unwrap();
        assert_eq!(writer.sequence(), 0);

        reader.read_packet().unwrap();
        assert_eq!(reader.sequence(), 0);
    }

    #[test]
    fn test_enable_buffer_only_once() {
        let (client, _server) = tcp_pair();
        let mut conn = Conn::new(client);

        conn.enable_buffer().unwrap();
        let err = conn.enable_buffer().unwrap_err();
        assert!(matches!(err, Error::BufferAlreadyEnabled));
    }

    #[test]
    fn test_buffered_connection_refuses_transport_swap() {
        let (client, server) = tcp_pair();
        let mut conn = Conn::new(client);
        conn.enable_buffer().unwrap();

        assert!(matches!(
            conn.take_stream(),
            Err(Error::BufferedTransportSwap)
        ));
        assert!(matches!(
            conn.replace_stream(server),
            Err(Error::BufferedTransportSwap)
        ));
    }

    #[test]
    fn test_buffered_reads_still_frame_correctly() {
        let (client, server) = tcp_pair();
        let mut writer = Conn::new(client);
        let mut reader = Conn::new(server);
        reader.enable_buffer().unwrap();

        for i in 0u8..3 {
            let mut data = vec![0u8; 4];
            data.extend_from_slice(&[i; 10]);
            writer.write_packet(&mut data).unwrap();
        }
        for i in 0u8..3 {
            assert_eq!(reader.read_packet().unwrap(), vec![i; 10]);
        }
    }

    #[test]
    fn test_write_rejects_buffer_without_header_reserve() {
        let (client, _server) = tcp_pair();
        let mut conn = Conn::new(client);

        let mut data = vec![0u8; 3];
        assert!(matches!(
            conn.write_packet(&mut data),
            Err(Error::InvalidPayloadLength(3))
        ));
    }

    #[test]
    fn test_close_resets_sequence() {
        let (client, _server) = tcp_pair();
        let mut conn = Conn::new(client);
        conn.set_sequence(9);
        conn.close().unwrap();
        assert_eq!(conn.sequence(), 0);

        let mut data = vec![0u8; 5];
        assert!(conn.write_packet(&mut data).is_err());
    }

    #[test]
    fn test_dump_captures_both_directions() {
        let (client, server) = tcp_pair();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut writer = Conn::with_dump(client, PacketDump::new(sink.clone()));
        let mut reader = Conn::with_dump(server, PacketDump::new(sink.clone()));

        let mut data = vec![0u8; 4];
        data.extend_from_slice(b"dump me");
        writer.write_packet(&mut data).unwrap();
        reader.read_packet().unwrap();

        let captured = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
        assert!(captured.contains(">> Writing sequence #0:"));
        assert!(captured.contains("<< Reading sequence #1:"));
        assert!(captured.contains("|dump me|"));
    }

    #[test]
    fn test_concurrent_read_write_threads() {
        let (client, server) = tcp_pair();
        let mut writer = Conn::new(client);
        let mut reader = Conn::new(server);

        let handle = thread::spawn(move || {
            for i in 0..10u8 {
                let mut data = vec![0u8; 4];
                data.extend_from_slice(&[i; 100]);
                writer.write_packet(&mut data).unwrap();
            }
        });

        for i in 0..10u8 {
            assert_eq!(reader.read_packet().unwrap(), vec![i; 100]);
        }
        handle.join().unwrap();
    }
}
