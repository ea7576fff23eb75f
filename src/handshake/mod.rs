//! Connection handshake and authentication
//!
//! Server-side implementation of the MySQL connection phase: send the
//! protocol-version-10 greeting, receive the client's handshake response,
//! optionally upgrade the transport to TLS in place when the client sets
//! the SSL capability bit, then validate the user and credentials.
//!
//! The handshake is a straight-line state machine per connection:
//!
//! ```text
//! greeting sent -> response received -> [TLS upgrade -> response again]
//!               -> user validated -> credentials validated -> accepted
//! ```
//!
//! Credential verification is pluggable through [`Authenticator`]; without
//! one, a single statically configured user/password pair is checked using
//! the `mysql_native_password` scramble.

pub mod auth;
pub mod capability;
pub mod server;

pub use auth::{scramble, Authenticator, CredentialStore, DatabaseHandler};
pub use capability::CapabilityFlags;
pub use server::{Authenticated, ServerHandshake};

/// Result type for handshake operations
pub type Result<T> = std::result::Result<T, HandshakeError>;

/// Protocol version sent in the greeting
pub const PROTOCOL_VERSION: u8 = 10;

/// Server version string sent in the greeting
pub const SERVER_VERSION: &str = "5.7.0-mysql-wire";

/// Default collation id (utf8_general_ci)
pub const DEFAULT_COLLATION_ID: u8 = 33;

/// Default server status flags (autocommit enabled)
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

/// Length of the per-connection random challenge
pub const SALT_LENGTH: usize = 20;

/// MySQL error code: access denied for user
pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;

/// MySQL error code: no such user
pub const ER_NO_SUCH_USER: u16 = 1449;

/// Handshake errors
///
/// Authentication failures carry the structured context (error code, user,
/// client address) the command layer needs to build a protocol-correct ERR
/// packet before closing the connection.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Packet transport failure (framing violation or connection error)
    #[error(transparent)]
    Packet(#[from] crate::packet::Error),

    /// TLS failure during the in-place upgrade
    #[error(transparent)]
    Tls(#[from] crate::tls::TlsError),

    /// Client requested TLS but this listener has no TLS configuration
    #[error("client requested TLS, but no server configuration is present")]
    TlsNotConfigured,

    /// Handshake response was truncated or otherwise unparseable
    #[error("malformed handshake response: {0}")]
    Malformed(&'static str),

    /// Presented user name is not recognized
    #[error("no such user '{user}' from {addr}")]
    NoSuchUser {
        code: u16,
        user: String,
        addr: String,
    },

    /// Credential check failed for a recognized user
    #[error("access denied for user '{user}'@'{addr}' (using password: {using_password})")]
    AccessDenied {
        code: u16,
        user: String,
        addr: String,
        using_password: bool,
    },

    /// The database-selection collaborator rejected the requested schema
    #[error("failed to select database '{db}': {reason}")]
    UseDatabase { db: String, reason: String },
}

impl HandshakeError {
    /// MySQL error code for authentication rejections, if applicable
    pub fn error_code(&self) -> Option<u16> {
        match self {
            HandshakeError::NoSuchUser { code, .. } => Some(*code),
            HandshakeError::AccessDenied { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_expose_their_code() {
        let err = HandshakeError::NoSuchUser {
            code: ER_NO_SUCH_USER,
            user: "nobody".to_string(),
            addr: "127.0.0.1:5".to_string(),
        };
        assert_eq!(err.error_code(), Some(ER_NO_SUCH_USER));

        let err = HandshakeError::AccessDenied {
            code: ER_ACCESS_DENIED_ERROR,
            user: "root".to_string(),
            addr: "127.0.0.1:5".to_string(),
            using_password: true,
        };
        assert_eq!(err.error_code(), Some(ER_ACCESS_DENIED_ERROR));
        assert!(err.to_string().contains("root"));
        assert!(err.to_string().contains("127.0.0.1:5"));

        assert_eq!(HandshakeError::TlsNotConfigured.error_code(), None);
    }
}
