//! TLS wrapping and trust strategies (§4.1, §6 `trust_strategy`).

use std::sync::Arc;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, Error as RustlsError, ServerName};
use tokio_rustls::TlsConnector;

use crate::config::TrustStrategy;
use crate::error::Error;

/// Accepts every certificate without validation. Only reachable via
/// `TrustStrategy::TrustAll`, which callers should reserve for local
/// development against self-signed servers.
struct AcceptAllVerifier;

impl ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Build a `rustls::ClientConfig` from the configured trust strategy. Any
/// failure to load roots/certs becomes a [`Error::Security`] (§7
/// `SecurityError`), since it means TLS cannot proceed safely.
pub fn client_config(strategy: &TrustStrategy) -> crate::error::Result<Arc<ClientConfig>> {
    let config = match strategy {
        TrustStrategy::TrustAll => ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier))
            .with_no_client_auth(),
        TrustStrategy::TrustSystemCas => {
            let mut roots = rustls::RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs()
                .map_err(|e| Error::security(format!("failed to load native CA roots: {e}")))?;
            for cert in native {
                roots
                    .add(&Certificate(cert.0))
                    .map_err(|e| Error::security(format!("invalid native CA certificate: {e}")))?;
            }
            ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
        TrustStrategy::TrustCustomCas(pem_blobs) => {
            let mut roots = rustls::RootCertStore::empty();
            for pem in pem_blobs {
                let mut reader = std::io::Cursor::new(pem);
                let certs = rustls_pemfile::certs(&mut reader)
                    .map_err(|e| Error::security(format!("invalid custom CA pem: {e}")))?;
                for der in certs {
                    roots
                        .add(&Certificate(der))
                        .map_err(|e| Error::security(format!("invalid custom CA certificate: {e}")))?;
                }
            }
            ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
    };
    Ok(Arc::new(config))
}

pub fn connector(strategy: &TrustStrategy) -> crate::error::Result<TlsConnector> {
    Ok(TlsConnector::from(client_config(strategy)?))
}
