//! Client TLS configuration for the transaction engine (§4.9 Connect).
//!
//! Builds an outbound `rustls::ClientConfig` against the public CA set
//! rather than a pinned or no-verification trust store; there is no
//! toggle to disable certificate verification.

use std::sync::Arc;

use tokio_rustls::rustls::{self, SupportedCipherSuite, SupportedProtocolVersion};
use tokio_rustls::rustls::crypto::aws_lc_rs;

/// `{TLS_AES_128_GCM_SHA256, TLS_AES_256_GCM_SHA384, TLS_CHACHA20_POLY1305_SHA256}`,
/// server-honored order (§4.9). These are TLS 1.3-only suites; see
/// DESIGN.md for the resulting TLS 1.2 interaction this preserves from
/// the literal spec text.
const CIPHER_SUITES: &[SupportedCipherSuite] = &[
    aws_lc_rs::cipher_suite::TLS13_AES_128_GCM_SHA256,
    aws_lc_rs::cipher_suite::TLS13_AES_256_GCM_SHA384,
    aws_lc_rs::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
];

const PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12, &rustls::version::TLS13];

pub fn build_client_config() -> Result<Arc<rustls::ClientConfig>, rustls::Error> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::CryptoProvider {
        cipher_suites: CIPHER_SUITES.to_vec(),
        ..aws_lc_rs::default_provider()
    });

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(PROTOCOL_VERSIONS)?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}
