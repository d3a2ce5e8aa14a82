//! TLS certificate expiry probe.
//!
//! Completes a handshake with `host:443` and reads the leaf certificate's
//! `notAfter`. The verifier accepts any chain so that expired or
//! self-signed certificates are still measured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use super::{ExpiryResult, ProbeError, TlsProbe, TlsResult};

const TLS_PORT: u16 = 443;

/// Reads certificate expiry from a TLS handshake.
pub struct TlsProber {
    port: u16,
    timeout: Duration,
}

impl TlsProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            port: TLS_PORT,
            timeout,
        }
    }

    #[cfg(test)]
    fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn connector(&self) -> Result<TlsConnector, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CaptureVerifier { provider }))
            .with_no_client_auth();

        Ok(TlsConnector::from(Arc::new(config)))
    }

    async fn fetch_leaf_expiry(&self, host: &str) -> Result<DateTime<Utc>, String> {
        let connector = self.connector().map_err(|e| e.to_string())?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| format!("invalid server name: {}", host))?;

        let stream = TcpStream::connect((host, self.port))
            .await
            .map_err(|e| format!("connect failed: {}", e))?;
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| format!("handshake failed: {}", e))?;

        let (_io, connection) = tls_stream.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| "no certificate presented".to_string())?;

        leaf_not_after(leaf.as_ref())
    }
}

#[async_trait]
impl TlsProbe for TlsProber {
    async fn probe(&self, host: &str) -> Result<TlsResult, ProbeError> {
        let tls_error = |cause: String| ProbeError::Tls {
            host: host.to_string(),
            cause,
        };

        let expires_at = timeout(self.timeout, self.fetch_leaf_expiry(host))
            .await
            .map_err(|_| tls_error(format!("handshake timed out after {:?}", self.timeout)))?
            .map_err(tls_error)?;

        Ok(ExpiryResult::new(Some(expires_at), Utc::now()))
    }
}

/// `notAfter` of a DER-encoded certificate.
pub fn leaf_not_after(der: &[u8]) -> Result<DateTime<Utc>, String> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| format!("failed to parse certificate: {:?}", e))?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| format!("certificate expiry out of range: {}", timestamp))
}

/// Accepts any certificate but still checks handshake signatures.
#[derive(Debug)]
struct CaptureVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for CaptureVerifier {
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

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
