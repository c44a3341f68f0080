//! Gateway endpoint selection and client TLS configuration.
//!
//! APNs authenticates providers with a client certificate presented during
//! the TLS handshake. [`ClientTls`] is built from PEM bytes (certificate
//! chain + private key); file loading stays with the caller.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;

/// Production gateway host.
pub const PRODUCTION_HOST: &str = "gateway.push.apple.com";

/// Sandbox gateway host.
pub const SANDBOX_HOST: &str = "gateway.sandbox.push.apple.com";

/// Gateway port (same for production and sandbox).
pub const GATEWAY_PORT: u16 = 2195;

/// Default overall connect timeout (TCP + TLS handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// TLS configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Certificate parsing error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Private key parsing error.
    #[error("private key error: {0}")]
    PrivateKey(String),

    /// TLS configuration error.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

/// Which APNs gateway to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `gateway.push.apple.com:2195`.
    Production,
    /// `gateway.sandbox.push.apple.com:2195`.
    Sandbox,
    /// Arbitrary host/port, for test gateways.
    Custom {
        /// Gateway hostname (also used for TLS server name verification).
        host: String,
        /// Gateway port.
        port: u16,
    },
}

impl Endpoint {
    /// Gateway hostname.
    pub fn host(&self) -> &str {
        match self {
            Endpoint::Production => PRODUCTION_HOST,
            Endpoint::Sandbox => SANDBOX_HOST,
            Endpoint::Custom { host, .. } => host,
        }
    }

    /// Gateway port.
    pub fn port(&self) -> u16 {
        match self {
            Endpoint::Production | Endpoint::Sandbox => GATEWAY_PORT,
            Endpoint::Custom { port, .. } => *port,
        }
    }
}

/// Client TLS context with a provider certificate and private key.
#[derive(Clone)]
pub struct ClientTls {
    pub(crate) config: Arc<ClientConfig>,
}

impl std::fmt::Debug for ClientTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTls").finish_non_exhaustive()
    }
}

impl ClientTls {
    /// Start building a TLS context.
    pub fn builder() -> ClientTlsBuilder {
        ClientTlsBuilder::new()
    }
}

/// Builder for [`ClientTls`].
///
/// Certificate and key are required; extra root certificates are only
/// needed when the gateway's certificate does not chain to a public root
/// (test gateways).
#[derive(Default)]
pub struct ClientTlsBuilder {
    cert_pem: Option<Vec<u8>>,
    key_pem: Option<Vec<u8>>,
    root_ca_pems: Vec<Vec<u8>>,
}

impl ClientTlsBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider certificate chain in PEM format.
    #[must_use]
    pub fn cert_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.cert_pem = Some(pem.into());
        self
    }

    /// Set the provider private key in PEM format.
    #[must_use]
    pub fn key_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.key_pem = Some(pem.into());
        self
    }

    /// Add a root CA certificate in PEM format. When none are added, the
    /// webpki public roots are used.
    #[must_use]
    pub fn root_ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_ca_pems.push(pem.into());
        self
    }

    /// Build the TLS context.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate or key is missing or does not
    /// parse, or if rustls rejects the combination.
    pub fn build(self) -> Result<ClientTls, ConfigError> {
        let cert_pem = self
            .cert_pem
            .ok_or_else(|| ConfigError::TlsConfig("client certificate required".into()))?;
        let key_pem = self
            .key_pem
            .ok_or_else(|| ConfigError::TlsConfig("client private key required".into()))?;

        let certs = parse_certificates(&cert_pem)?;
        if certs.is_empty() {
            return Err(ConfigError::Certificate("no certificates found".into()));
        }
        let key = parse_private_key(&key_pem)?;

        let mut root_store = RootCertStore::empty();
        if self.root_ca_pems.is_empty() {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        } else {
            for pem in &self.root_ca_pems {
                for cert in parse_certificates(pem)? {
                    root_store.add(cert).map_err(|e| {
                        ConfigError::Certificate(format!("failed to add root CA: {e}"))
                    })?;
                }
            }
        }

        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_client_auth_cert(certs, key)
            .map_err(|e| ConfigError::TlsConfig(format!("client config error: {e}")))?;

        Ok(ClientTls {
            config: Arc::new(config),
        })
    }
}

/// Parse PEM-encoded certificates.
fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::Certificate(format!("failed to parse certificates: {e}")))
}

/// Parse a PEM-encoded private key.
fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, ConfigError> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| ConfigError::PrivateKey(format!("failed to parse private key: {e}")))
}

/// Everything a [`GatewayConnection`](crate::gateway::GatewayConnection)
/// needs to reach the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Which gateway to connect to.
    pub endpoint: Endpoint,
    /// Client TLS context.
    pub tls: ClientTls,
    /// Overall connect timeout (TCP + TLS handshake).
    pub connect_timeout: Duration,
}

impl GatewayConfig {
    /// Create a config with the default connect timeout.
    pub fn new(endpoint: Endpoint, tls: ClientTls) -> Self {
        Self {
            endpoint,
            tls,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
