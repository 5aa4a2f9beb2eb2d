//! Transport for the gateway-to-console hop.
//!
//! Console backends (ESXi WebMKS endpoints) present self-signed certificates,
//! so this hop uses a rustls configuration that accepts any server
//! certificate. That configuration is built here and used nowhere else: the
//! client-facing listener and the directory client keep normal verification.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use vmrc_core::BackendAddr;

/// A connected byte stream to a console backend.
pub trait BackendIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> BackendIo for T {}

pub type BoxedIo = Box<dyn BackendIo>;

#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, backend: &BackendAddr) -> io::Result<BoxedIo>;
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
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
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS connector for console backends, without certificate verification.
pub struct InsecureTlsConnector {
    connector: TlsConnector,
    connect_timeout: Duration,
}

impl InsecureTlsConnector {
    pub fn new(connect_timeout: Duration) -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth();
        // The forwarded request is spoken over HTTP/1.1
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            connect_timeout,
        })
    }
}

pub(crate) async fn dial(
    backend: &BackendAddr,
    connect_timeout: Duration,
) -> io::Result<TcpStream> {
    let tcp = tokio::time::timeout(
        connect_timeout,
        TcpStream::connect((backend.host(), backend.port())),
    )
    .await
    .map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {backend} timed out"),
        )
    })??;
    tcp.set_nodelay(true)?;
    Ok(tcp)
}

#[async_trait]
impl BackendConnector for InsecureTlsConnector {
    async fn connect(&self, backend: &BackendAddr) -> io::Result<BoxedIo> {
        let tcp = dial(backend, self.connect_timeout).await?;
        let server_name = ServerName::try_from(backend.host().to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let tls = self.connector.connect(server_name, tcp).await?;
        Ok(Box::new(tls))
    }
}

/// Plain TCP connector, standing in for a console backend in tests.
#[cfg(test)]
pub struct PlainConnector {
    pub dialed: std::sync::Mutex<Vec<BackendAddr>>,
    /// Overrides the dialed address, so a test can pretend any backend
    /// lives on a loopback listener.
    pub redirect_to: Option<BackendAddr>,
}

#[cfg(test)]
impl PlainConnector {
    pub fn new() -> Self {
        Self {
            dialed: std::sync::Mutex::new(Vec::new()),
            redirect_to: None,
        }
    }

    pub fn redirecting_to(target: BackendAddr) -> Self {
        Self {
            dialed: std::sync::Mutex::new(Vec::new()),
            redirect_to: Some(target),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl BackendConnector for PlainConnector {
    async fn connect(&self, backend: &BackendAddr) -> io::Result<BoxedIo> {
        self.dialed.lock().unwrap().push(backend.clone());
        let target = self.redirect_to.as_ref().unwrap_or(backend);
        let tcp = dial(target, Duration::from_secs(5)).await?;
        Ok(Box::new(tcp))
    }
}
