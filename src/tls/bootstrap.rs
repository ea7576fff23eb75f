//! Process-wide TLS defaults
//!
//! One-time initialization of the TLS layer: forces OpenSSL library setup
//! and the P-256 curve construction before any concurrent connection
//! handling begins (lazy first-use initialization of the curve is not safe
//! under parallel handshakes), then publishes default listen/dial
//! configurations built from the bundled certificate. If the bundled
//! material fails to parse, the defaults stay unset and the handshake
//! layer will refuse TLS upgrades.

use super::builtin_cert::BUILTIN_CERT;
use super::config::TlsConfig;
use openssl::ec::EcGroup;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::X509;
use std::sync::{Once, OnceLock};

struct Defaults {
    listen: TlsConfig,
    dial: TlsConfig,
}

static INIT: Once = Once::new();
static DEFAULTS: OnceLock<Option<Defaults>> = OnceLock::new();

/// Initialize the TLS layer; runs at most once per process
///
/// Called implicitly by the default-config accessors; call it explicitly
/// from process startup if connections are handled on multiple threads.
pub fn init() {
    INIT.call_once(|| {
        openssl::init();
        // force curve setup single-threaded before any handshaking
        let _ = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1);

        let parsed = X509::from_pem(BUILTIN_CERT.as_bytes())
            .and_then(|_| PKey::private_key_from_pem(BUILTIN_CERT.as_bytes()));

        let defaults = match parsed {
            Ok(_) => {
                let mut listen = TlsConfig::new();
                listen.certificate_pem = Some(BUILTIN_CERT.to_string());
                listen.server_name = Some("localhost".to_string());

                // the bundled certificate is not CA-issued, so the dial
                // side cannot verify it
                let dial = TlsConfig::new();
                debug_assert!(!dial.verify_peer);

                Some(Defaults { listen, dial })
            }
            Err(e) => {
                tracing::warn!(error = %e, "unable to load default certificate");
                None
            }
        };
        let _ = DEFAULTS.set(defaults);
    });
}

/// Default server-side configuration: bundled certificate, name `localhost`
///
/// `None` if the bundled certificate material failed to parse.
pub fn default_listen_config() -> Option<&'static TlsConfig> {
    init();
    DEFAULTS.get().and_then(|d| d.as_ref()).map(|d| &d.listen)
}

/// Default client-side configuration: peer verification disabled
///
/// `None` if the bundled certificate material failed to parse.
pub fn default_dial_config() -> Option<&'static TlsConfig> {
    init();
    DEFAULTS.get().and_then(|d| d.as_ref()).map(|d| &d.dial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_published() {
        init();
        init(); // idempotent

        let listen = default_listen_config().unwrap();
        assert!(listen.certificate_pem.is_some());
        assert_eq!(listen.server_name.as_deref(), Some("localhost"));

        let dial = default_dial_config().unwrap();
        assert!(!dial.verify_peer);
        assert!(dial.certificate_pem.is_none());
    }

    #[test]
    fn test_per_connection_copies_come_from_the_serving_clone() {
        let listen = default_listen_config().unwrap();
        let copy = listen.clone_for_serving();
        assert_eq!(copy.certificate_pem, listen.certificate_pem);
        assert!(!copy.has_context());
    }
}
