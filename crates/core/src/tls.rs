//! TLS material loading.
//!
//! One [`TlsMaterial`] is built per connection target from its
//! [`TlsConfig`] section. It configures both the HTTP client used for
//! control requests and the raw rustls client used by the livestream.
//! Verification overrides live on the material itself, so they never leak
//! between targets.

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;

use crate::config::TlsConfig;

/// Errors while loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid PEM in {path}: {reason}")]
    Pem { path: String, reason: String },

    #[error("TLS configuration error: {0}")]
    Config(String),
}

/// Client certificate, key and trust roots for one connection target.
pub struct TlsMaterial {
    identity_pem: Option<Vec<u8>>,
    client_certs: Vec<CertificateDer<'static>>,
    client_key: Option<PrivateKeyDer<'static>>,
    ca_pem: Option<Vec<u8>>,
    ca_certs: Vec<CertificateDer<'static>>,
    accept_invalid_certs: bool,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("client_certs", &self.client_certs.len())
            .field("client_key", &self.client_key.is_some())
            .field("ca_certs", &self.ca_certs.len())
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl TlsMaterial {
    /// Read the PEM files named by `config`.
    pub fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let mut material = Self {
            identity_pem: None,
            client_certs: Vec::new(),
            client_key: None,
            ca_pem: None,
            ca_certs: Vec::new(),
            accept_invalid_certs: config.accept_invalid_certs,
        };

        match (&config.cert_path, &config.key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert_pem = read_file(cert_path)?;
                let key_pem = read_file(key_path)?;
                material.client_certs = parse_certs(cert_path, &cert_pem)?;
                material.client_key = Some(parse_key(key_path, &key_pem)?);

                let mut identity = cert_pem;
                identity.push(b'\n');
                identity.extend_from_slice(&key_pem);
                material.identity_pem = Some(identity);
            }
            (None, None) => {}
            _ => {
                return Err(TlsError::Config(
                    "cert_path and key_path must be set together".to_string(),
                ))
            }
        }

        if let Some(ca_path) = &config.ca_path {
            let ca_pem = read_file(ca_path)?;
            material.ca_certs = parse_certs(ca_path, &ca_pem)?;
            material.ca_pem = Some(ca_pem);
        }

        Ok(material)
    }

    pub fn has_client_identity(&self) -> bool {
        self.client_key.is_some()
    }

    /// Apply this material to an HTTP client builder.
    pub fn apply_to(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, TlsError> {
        builder = builder.use_rustls_tls();

        if let Some(pem) = &self.identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| TlsError::Config(format!("client identity: {}", e)))?;
            builder = builder.identity(identity);
        }

        if let Some(pem) = &self.ca_pem {
            let ca = reqwest::Certificate::from_pem(pem)
                .map_err(|e| TlsError::Config(format!("CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(ca);
        }

        Ok(builder.danger_accept_invalid_certs(self.accept_invalid_certs))
    }

    /// Build a rustls client configuration for raw TLS sockets.
    ///
    /// Trust roots are the configured CA bundle, or the bundled web PKI roots
    /// when none is configured.
    pub fn rustls_config(&self) -> Result<Arc<ClientConfig>, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::Config(e.to_string()))?;

        let builder = if self.accept_invalid_certs {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoServerVerification { provider }))
        } else {
            let mut roots = RootCertStore::empty();
            if self.ca_certs.is_empty() {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            } else {
                for cert in &self.ca_certs {
                    roots
                        .add(cert.clone())
                        .map_err(|e| TlsError::Config(format!("CA certificate: {}", e)))?;
                }
            }
            builder.with_root_certificates(roots)
        };

        let config = match &self.client_key {
            Some(key) => builder
                .with_client_auth_cert(self.client_certs.clone(), key.clone_key())
                .map_err(|e| TlsError::Config(e.to_string()))?,
            None => builder.with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parse_certs(path: &Path, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Pem {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(TlsError::Pem {
            path: path.display().to_string(),
            reason: "no certificates found".to_string(),
        });
    }
    Ok(certs)
}

fn parse_key(path: &Path, pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| TlsError::Pem {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| TlsError::Pem {
            path: path.display().to_string(),
            reason: "no private key found".to_string(),
        })
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct NoServerVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoServerVerification {
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
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
