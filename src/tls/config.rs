//! TLS configuration
//!
//! [`TlsConfig`] carries the externally meaningful TLS settings as plain
//! fields and builds its OpenSSL context lazily, caching it in a
//! [`OnceLock`]. That cache is one-shot internal state that must never be
//! duplicated between configs, which is why `Clone` is deliberately not
//! derived: duplication goes through [`TlsConfig::clone_for_serving`] or
//! [`TlsConfig::clone_full`], both of which copy field by field and leave
//! the cache unset.

use openssl::pkey::PKey;
use openssl::ssl::{
    Ssl, SslContext, SslContextBuilder, SslMethod, SslOptions, SslStream, SslVerifyMode,
};
use openssl::x509::X509;
use std::net::TcpStream;
use std::sync::OnceLock;

/// TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Get the OpenSSL protocol version constant
    pub fn to_openssl_version(self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Length of a session ticket key (name + HMAC secret + AES key)
pub const SESSION_TICKET_KEY_LEN: usize = 48;

/// TLS configuration with explicit, inspectable fields
pub struct TlsConfig {
    /// PEM bundle holding the certificate chain and private key
    pub certificate_pem: Option<String>,
    /// Server name: SNI hostname when dialing, advertised name when listening
    pub server_name: Option<String>,
    /// Verify the peer certificate chain (off for the bundled self-signed pair)
    pub verify_peer: bool,
    /// Cipher list for TLS 1.2 and below
    pub cipher_list: Option<String>,
    /// Cipher suites for TLS 1.3
    pub ciphersuites: Option<String>,
    /// Minimum accepted protocol version
    pub min_version: Option<TlsVersion>,
    /// Maximum accepted protocol version
    pub max_version: Option<TlsVersion>,
    /// Disable session ticket resumption
    ///
    /// A live server may flip this in the background on ticket-key setup
    /// failure, which is why [`TlsConfig::clone_for_serving`] does not copy it.
    pub session_tickets_disabled: bool,
    /// Session ticket key material; same concurrency caveat as above
    pub session_ticket_key: Option<[u8; SESSION_TICKET_KEY_LEN]>,
    ctx: OnceLock<SslContext>,
}

impl TlsConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        TlsConfig {
            certificate_pem: None,
            server_name: None,
            verify_peer: false,
            cipher_list: None,
            ciphersuites: None,
            min_version: None,
            max_version: None,
            session_tickets_disabled: false,
            session_ticket_key: None,
            ctx: OnceLock::new(),
        }
    }

    /// Copy every externally meaningful field except the session-ticket
    /// fields, which a live, concurrently served configuration may mutate
    /// in the background. Safe to call on a config in active use.
    pub fn clone_for_serving(&self) -> TlsConfig {
        TlsConfig {
            certificate_pem: self.certificate_pem.clone(),
            server_name: self.server_name.clone(),
            verify_peer: self.verify_peer,
            cipher_list: self.cipher_list.clone(),
            ciphersuites: self.ciphersuites.clone(),
            min_version: self.min_version,
            max_version: self.max_version,
            session_tickets_disabled: false,
            session_ticket_key: None,
            ctx: OnceLock::new(),
        }
    }

    /// Copy every externally meaningful field, session-ticket fields
    /// included. Only for configurations not under concurrent mutation.
    pub fn clone_full(&self) -> TlsConfig {
        TlsConfig {
            certificate_pem: self.certificate_pem.clone(),
            server_name: self.server_name.clone(),
            verify_peer: self.verify_peer,
            cipher_list: self.cipher_list.clone(),
            ciphersuites: self.ciphersuites.clone(),
            min_version: self.min_version,
            max_version: self.max_version,
            session_tickets_disabled: self.session_tickets_disabled,
            session_ticket_key: self.session_ticket_key,
            ctx: OnceLock::new(),
        }
    }

    /// Whether the OpenSSL context has been built yet
    pub fn has_context(&self) -> bool {
        self.ctx.get().is_some()
    }

    /// Get the OpenSSL context, building it on first use
    pub fn context(&self) -> Result<&SslContext, TlsError> {
        if let Some(ctx) = self.ctx.get() {
            return Ok(ctx);
        }
        let built = self.build_context()?;
        Ok(self.ctx.get_or_init(|| built))
    }

    /// Accept a connection, running the server-side TLS handshake
    pub fn accept(&self, stream: TcpStream) -> Result<SslStream<TcpStream>, TlsError> {
        let ssl = Ssl::new(self.context()?)?;
        ssl.accept(stream)
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))
    }

    /// Connect, running the client-side TLS handshake
    ///
    /// Applies the configured server name as SNI hostname when present.
    pub fn connect(&self, stream: TcpStream) -> Result<SslStream<TcpStream>, TlsError> {
        let mut ssl = Ssl::new(self.context()?)?;
        if let Some(name) = &self.server_name {
            ssl.set_hostname(name)?;
        }
        ssl.connect(stream)
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))
    }

    fn build_context(&self) -> Result<SslContext, TlsError> {
        let mut builder = SslContextBuilder::new(SslMethod::tls())?;

        if let Some(pem) = &self.certificate_pem {
            let cert = X509::from_pem(pem.as_bytes())
                .map_err(|e| TlsError::Certificate(format!("failed to load certificate: {e}")))?;
            builder.set_certificate(&cert)?;

            let key = PKey::private_key_from_pem(pem.as_bytes())
                .map_err(|e| TlsError::Certificate(format!("failed to load private key: {e}")))?;
            builder.set_private_key(&key)?;
        }

        builder.set_verify(if self.verify_peer {
            SslVerifyMode::PEER
        } else {
            SslVerifyMode::NONE
        });

        builder.set_min_proto_version(self.min_version.map(TlsVersion::to_openssl_version))?;
        builder.set_max_proto_version(self.max_version.map(TlsVersion::to_openssl_version))?;

        if let Some(ciphers) = &self.cipher_list {
            builder.set_cipher_list(ciphers)?;
        }
        if let Some(ciphers) = &self.ciphersuites {
            builder.set_ciphersuites(ciphers)?;
        }

        if self.session_tickets_disabled {
            builder.set_options(SslOptions::NO_TICKET);
        }

        Ok(builder.build())
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("has_certificate", &self.certificate_pem.is_some())
            .field("server_name", &self.server_name)
            .field("verify_peer", &self.verify_peer)
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .field("session_tickets_disabled", &self.session_tickets_disabled)
            .field("has_session_ticket_key", &self.session_ticket_key.is_some())
            .finish_non_exhaustive()
    }
}
