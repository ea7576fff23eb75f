//! Packet-level diagnostic capture
//!
//! When a dump sink is attached to a connection, every logical packet read
//! or written is recorded as a hex dump annotated with direction and
//! sequence number. This is a debugging side channel only and never affects
//! protocol behavior. The sink is injected per connection rather than held
//! in process-wide state, so tests can capture one connection in isolation.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Transfer direction of a dumped packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Read => "<< Reading",
            Direction::Write => ">> Writing",
        }
    }
}

/// Cloneable handle to a packet dump sink
///
/// Writes are serialized through a mutex so a dump shared between
/// connections stays readable. Sink I/O errors are ignored; diagnostics
/// must never fail the connection.
#[derive(Clone)]
pub struct PacketDump {
    sink: Arc<Mutex<dyn Write + Send>>,
}

impl PacketDump {
    /// Create a dump handle writing to the given sink
    pub fn new(sink: Arc<Mutex<dyn Write + Send>>) -> Self {
        PacketDump { sink }
    }

    /// Record one logical packet
    pub(crate) fn record(&self, direction: Direction, sequence: u8, data: &[u8]) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        let _ = writeln!(sink, "{} sequence #{}:", direction.label(), sequence);
        let _ = sink.write_all(hex_dump(data).as_bytes());
    }
}

impl std::fmt::Debug for PacketDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketDump").finish_non_exhaustive()
    }
}

/// Format bytes as a classic 16-per-line hex dump with an ASCII gutter
fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for (i, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x} ", i * 16);
        for j in 0..16 {
            if j == 8 {
                out.push(' ');
            }
            match chunk.get(j) {
                Some(b) => {
                    let _ = write!(out, " {:02x}", b);
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  |");
        for &b in chunk {
            out.push(if (0x20..0x7f).contains(&b) { b as char } else { '.' });
        }
        out.push_str("|\n");
    }
    out
}
