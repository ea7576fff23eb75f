//! TLS bootstrap and configuration
//!
//! This module supplies everything the handshake layer needs to upgrade a
//! plaintext connection to TLS mid-handshake:
//!
//! 1. [`TlsConfig`] holds the externally meaningful TLS settings as plain
//!    fields and builds its OpenSSL context lazily. Duplication is
//!    field-by-field through [`TlsConfig::clone_for_serving`] (safe against
//!    a live server mutating session-ticket state) or
//!    [`TlsConfig::clone_full`]; the internal context cache is never copied.
//! 2. [`bootstrap::init`] performs process-wide one-time initialization and
//!    publishes default listen/dial configurations backed by a bundled
//!    self-signed localhost certificate, so opportunistic TLS works without
//!    external certificate provisioning.

pub mod bootstrap;
pub mod builtin_cert;
pub mod config;

pub use bootstrap::{default_dial_config, default_listen_config, init};
pub use config::{TlsConfig, TlsError, TlsVersion, SESSION_TICKET_KEY_LEN};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
