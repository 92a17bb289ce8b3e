//! TLS transport implementation
//!
//! Provides TLS-encrypted connections for `https` pools using rustls.

use super::{unbracket, SocketOpts, TcpTransport, Transport};
use crate::config::{PoolConfig, TlsConfig};
use crate::error::{HostpoolError, Result};
use async_trait::async_trait;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// TLS stream type alias
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// TLS transport for encrypted connections using rustls
#[derive(Clone)]
pub struct TlsTransport {
    /// TLS connector
    connector: TlsConnector,
    /// Name to verify instead of the pool host
    server_hostname: Option<String>,
    /// TCP layer beneath the handshake
    tcp: TcpTransport,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("server_hostname", &self.server_hostname)
            .field("tcp", &self.tcp)
            .finish()
    }
}

/// Add every certificate from a PEM file to the store
fn add_pem_file(root_store: &mut RootCertStore, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path).map_err(|e| {
        HostpoolError::Tls(format!("Failed to open certificate file {:?}: {}", path, e))
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            HostpoolError::Tls(format!("Failed to parse certificates from {:?}: {}", path, e))
        })?;

    let count = certs.len();
    for cert in certs {
        root_store
            .add(cert)
            .map_err(|e| HostpoolError::Tls(format!("Failed to add certificate: {}", e)))?;
    }
    Ok(count)
}

/// Build the root store from system roots plus configured bundles
fn root_store(config: &TlsConfig) -> Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    for cert in native_certs.certs {
        root_store.add(cert).ok();
    }

    if let Some(ref path) = config.ca_certs {
        add_pem_file(&mut root_store, path)?;
    }

    if let Some(ref dir) = config.ca_cert_dir {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            HostpoolError::Tls(format!("Failed to read certificate directory {:?}: {}", dir, e))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            // Directories such as /etc/ssl/certs also hold non-PEM files
            if let Err(e) = add_pem_file(&mut root_store, &path) {
                tracing::debug!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(root_store)
}

impl TlsTransport {
    /// Create a new TLS transport with the given configuration
    pub fn with_config(
        config: &TlsConfig,
        socket_opts: SocketOpts,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let tls_config = if config.verify {
            ClientConfig::builder()
                .with_root_certificates(root_store(config)?)
                .with_no_client_auth()
        } else {
            // Only meant for testing against self-signed servers
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        };

        Ok(TlsTransport {
            connector: TlsConnector::from(Arc::new(tls_config)),
            server_hostname: config.server_hostname.clone(),
            tcp: TcpTransport::with_defaults()
                .with_socket_opts(socket_opts)
                .with_connect_timeout(connect_timeout),
        })
    }
}

/// Certificate verifier that accepts all certificates (dangerous!)
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::ServerCertVerified,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA384,
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA512,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA384,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA512,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

#[async_trait]
impl Transport for TlsTransport {
    type Stream = TlsStream;

    const SCHEME: &'static str = "https";

    const DEFAULT_PORT: u16 = 443;

    fn new(config: &PoolConfig) -> Result<Self> {
        TlsTransport::with_config(
            &config.tls,
            SocketOpts::from_tcp_config(&config.tcp),
            config.connect_timeout(),
        )
    }

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream> {
        let tcp_stream = self.tcp.connect_tcp(host, port).await?;

        let hostname = self
            .server_hostname
            .as_deref()
            .unwrap_or_else(|| unbracket(host));

        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|e| HostpoolError::Tls(format!("Invalid hostname {}: {}", hostname, e)))?;

        let tls_stream = self
            .connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| HostpoolError::Tls(format!("TLS handshake failed with {}: {}", hostname, e)))?;

        tracing::debug!("TLS connection established to {}:{}", host, port);

        Ok(tls_stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_transport_skip_verify() {
        let config = TlsConfig {
            verify: false,
            server_hostname: Some("example.com".to_string()),
            ..Default::default()
        };

        let transport =
            TlsTransport::with_config(&config, SocketOpts::default(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(transport.server_hostname, Some("example.com".to_string()));
    }

    #[test]
    fn test_tls_transport_from_pool_config() {
        let transport = TlsTransport::new(&PoolConfig::default());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_tls_transport_missing_ca_certs() {
        let config = TlsConfig {
            ca_certs: Some("/nosuchfile.pem".into()),
            ..Default::default()
        };
        let err = TlsTransport::with_config(&config, SocketOpts::default(), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, HostpoolError::Tls(_)));
    }

    #[test]
    fn test_tls_transport_missing_ca_cert_dir() {
        let config = TlsConfig {
            ca_cert_dir: Some("/nosuchdir".into()),
            ..Default::default()
        };
        assert!(
            TlsTransport::with_config(&config, SocketOpts::default(), Duration::from_secs(5))
                .is_err()
        );
    }

    #[test]
    fn test_tls_transport_empty_ca_cert_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), "not a certificate").unwrap();
        let config = TlsConfig {
            ca_cert_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(
            TlsTransport::with_config(&config, SocketOpts::default(), Duration::from_secs(5))
                .is_ok()
        );
    }
}
