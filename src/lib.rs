//! apns-legacy: async client for Apple's legacy binary push protocol.
//!
//! Sends notifications to the APNs binary gateway over a persistent TLS
//! connection and delivers the error responses the gateway pushes back on
//! the same socket.
//!
//! # Architecture
//!
//! - **payload** - logical notification content → compact JSON bytes (pure)
//! - **frame** - JSON bytes + token/identifier/expiry → binary wire frames,
//!   plus the incremental error-response decoder (pure)
//! - **gateway** - TLS socket lifecycle: connect, ordered sends, the
//!   response read loop, disconnect
//! - **config** - endpoint selection and client-certificate TLS setup
//!
//! # Example
//!
//! ```no_run
//! use apns_legacy::{ClientTls, Endpoint, GatewayConfig, GatewayConnection};
//! use apns_legacy::{Notification, Payload};
//!
//! # async fn run(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> anyhow::Result<()> {
//! let tls = ClientTls::builder()
//!     .cert_pem(cert_pem)
//!     .key_pem(key_pem)
//!     .build()?;
//! let mut conn = GatewayConnection::new(GatewayConfig::new(Endpoint::Sandbox, tls));
//!
//! let mut responses = conn.subscribe_responses();
//! conn.connect().await?;
//!
//! let payload = Payload::new().alert("Hello World!").badge(1).to_bytes()?;
//! let notification = Notification::new(1, 0, "ab".repeat(32).as_str(), payload)?;
//! conn.send_notification(&notification).await?;
//!
//! if let Some(response) = responses.recv().await {
//!     eprintln!("gateway rejected {}: status {}", response.identifier, response.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The crate never reconnects or replays on its own. A non-zero gateway
//! status means the identified notification (and anything written after
//! it before the gateway processed the error) went undelivered; resend
//! policy belongs to the application.

pub mod config;
pub mod frame;
pub mod gateway;
pub mod payload;

// Re-export commonly used types
pub use config::{ClientTls, ConfigError, Endpoint, GatewayConfig};
pub use frame::{ErrorResponse, FrameError, Notification, NotificationBatch, ResponseDecoder};
pub use gateway::{ConnectionError, ConnectionState, DisconnectReason, GatewayConnection};
pub use payload::{Alert, Payload, PayloadAlert, PayloadError};
