//! mysql-wire - MySQL wire protocol core
//!
//! This crate implements the low-level wire protocol of a MySQL-compatible
//! server endpoint: length-prefixed, sequence-numbered packet framing and
//! the connection handshake, including the opportunistic mid-handshake TLS
//! upgrade that unmodified MySQL clients request via the SSL capability bit.

pub mod handshake;
pub mod packet;
pub mod tls;
