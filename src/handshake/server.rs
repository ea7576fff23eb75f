//! Server-side handshake state machine
//!
//! Owns one connection from greeting to accept/reject. The TLS upgrade is
//! expressed as a loop with an already-encrypted guard rather than
//! recursion: after the upgrade the client sends a second, real handshake
//! response over the encrypted channel and the loop parses it the same
//! way, with the sequence counter reset to account for the two plaintext
//! packets already exchanged.

use super::auth::{scramble, CredentialStore, DatabaseHandler};
use super::capability::CapabilityFlags;
use super::{
    HandshakeError, Result, DEFAULT_COLLATION_ID, ER_ACCESS_DENIED_ERROR, ER_NO_SUCH_USER,
    PROTOCOL_VERSION, SALT_LENGTH, SERVER_STATUS_AUTOCOMMIT, SERVER_VERSION,
};
use crate::packet::{Conn, Stream, HEADER_SIZE};
use crate::tls::{TlsConfig, TlsError};
use bytes::{BufMut, BytesMut};

/// Terminal accept outcome of a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    /// Authenticated user name
    pub user: String,
    /// Database selected during the handshake, if any
    pub database: Option<String>,
}

/// Per-connection server-side handshake state
pub struct ServerHandshake {
    conn: Conn,
    connection_id: u32,
    salt: [u8; SALT_LENGTH],
    status: u16,
    capability: CapabilityFlags,
    credentials: CredentialStore,
    tls_config: Option<TlsConfig>,
    db_handler: Option<Box<dyn DatabaseHandler>>,
}

impl ServerHandshake {
    /// Create the handshake state for a freshly accepted connection
    ///
    /// Generates the 20-byte salt. Salt bytes are constrained to 1..=126:
    /// the greeting embeds the salt as NUL-terminated auth-plugin data, so
    /// a zero byte inside it would truncate the challenge.
    pub fn new(conn: Conn, connection_id: u32, credentials: CredentialStore) -> Result<Self> {
        let mut salt = [0u8; SALT_LENGTH];
        openssl::rand::rand_bytes(&mut salt).map_err(TlsError::from)?;
        for b in &mut salt {
            *b = (*b % 126) + 1;
        }

        Ok(ServerHandshake {
            conn,
            connection_id,
            salt,
            status: SERVER_STATUS_AUTOCOMMIT,
            capability: CapabilityFlags::empty(),
            credentials,
            tls_config: None,
            db_handler: None,
        })
    }

    /// Attach the TLS configuration offered to clients requesting SSL
    pub fn with_tls_config(mut self, config: TlsConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Attach the database-selection collaborator
    pub fn with_database_handler(mut self, handler: Box<dyn DatabaseHandler>) -> Self {
        self.db_handler = Some(handler);
        self
    }

    /// Override the status flags sent in the greeting
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Per-connection challenge salt
    pub fn salt(&self) -> &[u8; SALT_LENGTH] {
        &self.salt
    }

    /// Capability mask from the client's handshake response
    ///
    /// Empty until a response has been received; fixed afterwards.
    pub fn client_capability(&self) -> CapabilityFlags {
        self.capability
    }

    /// The underlying packet connection
    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    /// Mutable access to the underlying packet connection
    pub fn conn_mut(&mut self) -> &mut Conn {
        &mut self.conn
    }

    /// Release the (possibly TLS-upgraded, now buffered) connection
    pub fn into_conn(self) -> Conn {
        self.conn
    }

    /// Run the full handshake: greeting, response, authentication
    pub fn run(&mut self) -> Result<Authenticated> {
        self.write_initial_handshake()?;
        self.read_handshake_response()
    }

    /// Build and send the protocol-version-10 greeting
    pub fn write_initial_handshake(&mut self) -> Result<()> {
        let capability = CapabilityFlags::server_default().as_u32();

        let mut data = BytesMut::with_capacity(128);
        data.put_bytes(0, HEADER_SIZE);

        data.put_u8(PROTOCOL_VERSION);
        data.put_slice(SERVER_VERSION.as_bytes());
        data.put_u8(0);
        data.put_u32_le(self.connection_id);
        // auth-plugin-data part 1
        data.put_slice(&self.salt[..8]);
        data.put_u8(0);
        data.put_u16_le((capability & 0xffff) as u16);
        data.put_u8(DEFAULT_COLLATION_ID);
        data.put_u16_le(self.status);
        data.put_u16_le((capability >> 16) as u16);
        // auth-plugin-data length marker
        data.put_u8(0x15);
        data.put_bytes(0, 10);
        // auth-plugin-data part 2
        data.put_slice(&self.salt[8..]);
        data.put_u8(0);

        let mut packet = data.to_vec();
        self.conn.write_packet(&mut packet)?;
        Ok(())
    }

    /// Receive and process the client's handshake response
    ///
    /// Loops at most twice: once for the plaintext response and, when the
    /// client requests SSL, once more for the real response sent over the
    /// freshly established TLS channel.
    pub fn read_handshake_response(&mut self) -> Result<Authenticated> {
        loop {
            let payload = self.conn.read_packet()?;
            if payload.len() < 4 {
                return Err(HandshakeError::Malformed("capability flags"));
            }
            let raw = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            self.capability = CapabilityFlags::from_u32(raw);

            if self.capability.contains(CapabilityFlags::SSL) {
                if self.tls_config.is_none() {
                    return Err(HandshakeError::TlsNotConfigured);
                }
                if !self.conn.is_encrypted() {
                    self.upgrade_to_tls()?;
                    continue;
                }
            }

            // the transport is final now; buffered reads are safe
            self.conn.enable_buffer()?;
            return self.process_response(&payload);
        }
    }

    /// Swap the plaintext transport for TLS and reset the sequence
    fn upgrade_to_tls(&mut self) -> Result<()> {
        let Some(config) = &self.tls_config else {
            return Err(HandshakeError::TlsNotConfigured);
        };

        let stream = self.conn.take_stream()?;
        let tcp = match stream {
            Stream::Tcp(tcp) => tcp,
            other => {
                let _ = self.conn.replace_stream(other);
                return Err(TlsError::InvalidConfig("transport is not plaintext".to_string()).into());
            }
        };

        let tls_stream = config.accept(tcp)?;
        self.conn.replace_stream(tls_stream)?;
        // one greeting and one response were exchanged in plaintext
        self.conn.set_sequence(2);

        tracing::debug!(connection_id = self.connection_id, "TLS upgrade complete");
        Ok(())
    }

    /// Parse the post-capability fields and authenticate
    fn process_response(&mut self, payload: &[u8]) -> Result<Authenticated> {
        let addr = self.client_addr();

        // capability(4) + max packet size(4) + charset(1, accepted but not
        // applied at this layer) + reserved(23)
        let mut pos = 32;
        if payload.len() < pos {
            return Err(HandshakeError::Malformed("response header"));
        }

        let user = take_cstr(payload, &mut pos, "user name")?.to_string();

        let known = match &self.credentials {
            CredentialStore::External(authenticator) => authenticator.valid_user(&user),
            CredentialStore::Static { user: expected, .. } => *expected == user,
        };
        if !known {
            tracing::debug!(user = %user, addr = %addr, "rejecting unknown user");
            return Err(HandshakeError::NoSuchUser {
                code: ER_NO_SUCH_USER,
                user,
                addr,
            });
        }

        let auth_len = *payload
            .get(pos)
            .ok_or(HandshakeError::Malformed("auth data length"))? as usize;
        pos += 1;
        let auth = payload
            .get(pos..pos + auth_len)
            .ok_or(HandshakeError::Malformed("auth data"))?;
        pos += auth_len;

        let valid = match &self.credentials {
            CredentialStore::External(authenticator) => authenticator.authenticate(&user, auth),
            CredentialStore::Static { password, .. } => {
                scramble(&self.salt, password.as_bytes()) == auth
            }
        };
        if !valid {
            tracing::debug!(user = %user, addr = %addr, "rejecting bad credentials");
            return Err(HandshakeError::AccessDenied {
                code: ER_ACCESS_DENIED_ERROR,
                user,
                addr,
                using_password: !auth.is_empty(),
            });
        }

        // historical quirk, kept for client compatibility: the mask is
        // OR-ed with CONNECT_WITH_DB instead of AND-ed, so trailing bytes
        // are treated as a database name no matter what the client set
        let mut database = None;
        if (self.capability.as_u32() | CapabilityFlags::CONNECT_WITH_DB) != 0
            && pos < payload.len()
        {
            let db = take_db(payload, &mut pos)?.to_string();
            if let Some(handler) = &mut self.db_handler {
                handler
                    .use_db(&db)
                    .map_err(|reason| HandshakeError::UseDatabase {
                        db: db.clone(),
                        reason,
                    })?;
            }
            database = Some(db);
        }

        Ok(Authenticated { user, database })
    }

    fn client_addr(&self) -> String {
        self.conn
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Read a NUL-terminated string and advance past the terminator
fn take_cstr<'a>(data: &'a [u8], pos: &mut usize, what: &'static str) -> Result<&'a str> {
    let rest = data.get(*pos..).ok_or(HandshakeError::Malformed(what))?;
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(HandshakeError::Malformed(what))?;
    let s = std::str::from_utf8(&rest[..nul]).map_err(|_| HandshakeError::Malformed(what))?;
    *pos += nul + 1;
    Ok(s)
}

/// Read the trailing database name; the terminator is optional since some
/// clients omit it on the last field of the packet
fn take_db<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a str> {
    let rest = &data[*pos..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let s = std::str::from_utf8(&rest[..end])
        .map_err(|_| HandshakeError::Malformed("database name"))?;
    *pos += end.min(rest.len() - 1) + 1;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_cstr() {
        let data = b"\x00\x00root\x00rest";
        let mut pos = 2;
        assert_eq!(take_cstr(data, &mut pos, "user").unwrap(), "root");
        assert_eq!(pos, 7);
    }

    #[test]
    fn test_take_cstr_missing_terminator_is_malformed() {
        let data = b"root";
        let mut pos = 0;
        assert!(matches!(
            take_cstr(data, &mut pos, "user"),
            Err(HandshakeError::Malformed("user"))
        ));
        assert_eq!(pos, 0);
    }

    #[test]
    fn test_take_db_with_and_without_terminator() {
        let mut pos = 0;
        assert_eq!(take_db(b"shop\x00", &mut pos).unwrap(), "shop");

        let mut pos = 0;
        assert_eq!(take_db(b"shop", &mut pos).unwrap(), "shop");
    }
}
