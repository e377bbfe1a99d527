//! TLS configuration for the client.
//!
//! The TLS capability is resolved once, at client construction time: root
//! certificates are loaded, the rustls config is built, and any problem
//! surfaces immediately as [`ConnectError::TlsUnavailable`] instead of
//! failing later inside a handshake.

use std::path::PathBuf;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::protocol::ConnectError;

/// TLS options recognized by the client configuration.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Path to a PEM bundle of trusted CA certificates. When unset, the OS
    /// certificate store is used.
    pub ca_bundle: Option<PathBuf>,
    /// Skip certificate and hostname verification entirely.
    pub danger_accept_invalid_certs: bool,
    /// Explicit server name for SNI and certificate verification, overriding
    /// the connection host (virtual-hosting and proxy setups).
    pub server_name: Option<String>,
}

/// A ready-to-use TLS client capability.
pub struct TlsContext {
    connector: TlsConnector,
    server_name_override: Option<ServerName<'static>>,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").field("server_name_override", &self.server_name_override).finish()
    }
}

impl TlsContext {
    /// Builds the TLS capability from the given options, failing fast when
    /// no usable trust anchors can be assembled.
    pub fn new(options: &TlsOptions) -> Result<Self, ConnectError> {
        let provider = crypto_provider();

        let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ConnectError::tls_unavailable(format!("failed to set protocol versions: {e}")))?;

        let config = if options.danger_accept_invalid_certs {
            warn!("certificate verification disabled, connections are not authenticated");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(danger::NoVerification::new(provider)))
                .with_no_client_auth()
        } else {
            let root_store = match &options.ca_bundle {
                Some(path) => bundle_roots(path)?,
                None => native_roots()?,
            };
            builder.with_root_certificates(root_store).with_no_client_auth()
        };

        let server_name_override = match &options.server_name {
            Some(name) => Some(
                ServerName::try_from(name.clone())
                    .map_err(|_| ConnectError::tls_unavailable(format!("invalid server name {name:?}")))?,
            ),
            None => None,
        };

        Ok(Self { connector: TlsConnector::from(Arc::new(config)), server_name_override })
    }

    pub fn connector(&self) -> &TlsConnector {
        &self.connector
    }

    /// The name presented for SNI and verified against the peer certificate:
    /// the configured override when present, else the connection host.
    pub fn server_name(&self, host: &str) -> Result<ServerName<'static>, ConnectError> {
        match &self.server_name_override {
            Some(name) => Ok(name.clone()),
            None => ServerName::try_from(host.to_string())
                .map_err(|_| ConnectError::tls_handshake(host, "host is not a valid server name")),
        }
    }
}

/// Reuse a globally installed crypto provider when one exists, otherwise
/// fall back to aws-lc-rs without installing it globally.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default().cloned().unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_roots() -> Result<rustls::RootCertStore, ConnectError> {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        return Err(ConnectError::tls_unavailable("no native root CA certificates found"));
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(result.certs);
    if ignored > 0 {
        warn!(added, ignored, "some native root certificates could not be parsed");
    }

    if added == 0 {
        return Err(ConnectError::tls_unavailable("no native root CA certificate could be parsed"));
    }

    debug!(count = added, "loaded native root certificates");
    Ok(root_store)
}

fn bundle_roots(path: &PathBuf) -> Result<rustls::RootCertStore, ConnectError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| ConnectError::tls_unavailable(format!("failed to read CA bundle {}: {e}", path.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectError::tls_unavailable(format!("invalid CA bundle {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(ConnectError::tls_unavailable(format!("CA bundle {} holds no certificates", path.display())));
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    if ignored > 0 {
        warn!(added, ignored, path = %path.display(), "some CA bundle certificates could not be parsed");
    }

    if added == 0 {
        return Err(ConnectError::tls_unavailable(format!(
            "no certificate in CA bundle {} could be parsed",
            path.display()
        )));
    }

    Ok(root_store)
}

mod danger {
    use std::sync::Arc;

    use rustls::DigitallySignedStruct;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
    use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

    /// Accepts any certificate and any hostname. Only installed when the
    /// caller explicitly opted out of verification.
    #[derive(Debug)]
    pub(super) struct NoVerification {
        provider: Arc<CryptoProvider>,
    }

    impl NoVerification {
        pub(super) fn new(provider: Arc<CryptoProvider>) -> Self {
            Self { provider }
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider.signature_verification_algorithms.supported_schemes()
        }
    }
}
