//! Client capability flags
//!
//! The capability mask is sent by the server in the greeting and echoed
//! (with the client's choices) in the handshake response. Only the subset
//! needed for long-password/secure-connection/SSL/protocol-41
//! authentication is modeled here.

use std::fmt;

/// Capability bitmask exchanged during the handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags(u32);

impl CapabilityFlags {
    /// Create empty flags
    pub fn empty() -> Self {
        CapabilityFlags(0)
    }

    /// Create from the raw wire value
    pub fn from_u32(flags: u32) -> Self {
        CapabilityFlags(flags)
    }

    /// Get the raw wire value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u32) {
        self.0 |= flag;
    }

    /// Check if a flag is set
    pub fn contains(&self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Default capability mask advertised in the server greeting
    ///
    /// SSL is always offered; whether an upgrade can actually be served
    /// depends on the listener's TLS configuration.
    pub fn server_default() -> Self {
        CapabilityFlags(
            Self::LONG_PASSWORD
                | Self::LONG_FLAG
                | Self::CONNECT_WITH_DB
                | Self::PROTOCOL_41
                | Self::TRANSACTIONS
                | Self::SECURE_CONNECTION
                | Self::SSL,
        )
    }

    /// CLIENT_LONG_PASSWORD (0x1)
    pub const LONG_PASSWORD: u32 = 0x1;

    /// CLIENT_FOUND_ROWS (0x2)
    pub const FOUND_ROWS: u32 = 0x2;

    /// CLIENT_LONG_FLAG (0x4)
    pub const LONG_FLAG: u32 = 0x4;

    /// CLIENT_CONNECT_WITH_DB (0x8)
    pub const CONNECT_WITH_DB: u32 = 0x8;

    /// CLIENT_PROTOCOL_41 (0x200)
    pub const PROTOCOL_41: u32 = 0x200;

    /// CLIENT_SSL (0x800)
    pub const SSL: u32 = 0x800;

    /// CLIENT_TRANSACTIONS (0x2000)
    pub const TRANSACTIONS: u32 = 0x2000;

    /// CLIENT_SECURE_CONNECTION (0x8000)
    pub const SECURE_CONNECTION: u32 = 0x8000;
}

impl fmt::Display for CapabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
