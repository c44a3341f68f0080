//! Persistent TLS connection to the APNs gateway.
//!
//! [`GatewayConnection`] owns the socket lifecycle: connect, send,
//! disconnect, and the background task that decodes error responses the
//! gateway pushes back on the same connection.
//!
//! # Architecture
//!
//! `connect` performs the TCP + TLS handshake, keeps the write half on the
//! connection object (so sends stay in call order), and spawns a read task
//! for the read half. The read task feeds a
//! [`ResponseDecoder`](crate::frame::ResponseDecoder) and fans decoded
//! responses out to subscribed channels. Any fatal transport event (EOF,
//! I/O error, decode failure) flips the shared state to `Disconnected`,
//! notifies disconnect subscribers, and ends the task.
//!
//! The connection never reconnects or resends by itself: after a gateway
//! error response, which notifications need replaying is application
//! policy, keyed off the echoed identifier.

// Rust guideline compliant 2026-02

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::GatewayConfig;
use crate::frame::{ErrorResponse, Notification, NotificationBatch, ResponseDecoder};

/// Connection lifecycle errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `send` was called while not connected. The socket is untouched;
    /// nothing is buffered for later.
    #[error("not connected to the gateway")]
    NotConnected,

    /// TCP connect or TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// The connect attempt exceeded the configured timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The transport failed mid-operation; the connection is now
    /// disconnected.
    #[error("transport error: {0}")]
    TransportReset(#[from] std::io::Error),
}

/// Connection manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; `connect` may be called.
    Disconnected,
    /// TCP/TLS handshake in progress.
    Connecting,
    /// Handshake complete; sends are accepted and the read loop is running.
    Connected,
}

/// Why a connection died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The gateway closed the connection, with or without a TLS
    /// close_notify (Apple's gateway drops the socket abruptly).
    Eof,
    /// A transport-level read or write error.
    Transport(String),
    /// The response stream was malformed (out of sync).
    Decode(String),
    /// [`GatewayConnection::disconnect`] was called locally.
    Local,
}

/// State shared between the connection object and its read task.
struct Shared {
    state: ConnectionState,
    response_listeners: Vec<UnboundedSender<ErrorResponse>>,
    disconnect_listeners: Vec<UnboundedSender<DisconnectReason>>,
}

/// Lock helper: a poisoned mutex only means a panicking thread held it;
/// the data (plain state + channel handles) is still coherent.
fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection to one APNs gateway.
///
/// Explicitly constructed and owned; there is no process-wide singleton.
/// Reconnecting after a failure is the caller's job: observe a
/// [`DisconnectReason`] (or a send error) and call
/// [`GatewayConnection::connect`] again.
pub struct GatewayConnection {
    config: GatewayConfig,
    shared: Arc<Mutex<Shared>>,
    writer: Option<WriteHalf<TlsStream<TcpStream>>>,
    read_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl GatewayConnection {
    /// Create a connection manager in the `Disconnected` state.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                response_listeners: Vec::new(),
                disconnect_listeners: Vec::new(),
            })),
            writer: None,
            read_task: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Whether sends are currently accepted.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to decoded gateway error responses.
    ///
    /// Every response reaches every subscriber, in subscription order.
    /// May be called before or after `connect`; subscriptions survive
    /// reconnects. Dropping the receiver unsubscribes.
    pub fn subscribe_responses(&self) -> UnboundedReceiver<ErrorResponse> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared).response_listeners.push(tx);
        rx
    }

    /// Subscribe to connection-death notifications.
    pub fn subscribe_disconnects(&self) -> UnboundedReceiver<DisconnectReason> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared).disconnect_listeners.push(tx);
        rx
    }

    /// Establish the TLS connection and start the response read loop.
    ///
    /// No-op when already connected. On failure the state stays
    /// `Disconnected` and no retry is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Timeout`] if the handshake does not
    /// complete within the configured timeout,
    /// [`ConnectionError::HandshakeFailed`] on TLS failure, or
    /// [`ConnectionError::TransportReset`] on TCP failure.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Ok(());
        }
        // Clear any stale read task / writer from a previous connection.
        self.teardown();

        let host = self.config.endpoint.host().to_string();
        let port = self.config.endpoint.port();
        lock(&self.shared).state = ConnectionState::Connecting;

        let result = timeout(
            self.config.connect_timeout,
            self.handshake(&host, port),
        )
        .await;

        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                lock(&self.shared).state = ConnectionState::Disconnected;
                log::warn!("[Gateway] Connect to {host}:{port} failed: {e}");
                return Err(e);
            }
            Err(_) => {
                lock(&self.shared).state = ConnectionState::Disconnected;
                log::warn!(
                    "[Gateway] Connect to {host}:{port} timed out after {:?}",
                    self.config.connect_timeout
                );
                return Err(ConnectionError::Timeout(self.config.connect_timeout));
            }
        };

        let (read_half, write_half) = tokio::io::split(stream);
        self.writer = Some(write_half);
        lock(&self.shared).state = ConnectionState::Connected;
        self.read_task = Some(tokio::spawn(Self::read_loop(
            read_half,
            Arc::clone(&self.shared),
        )));

        log::info!("[Gateway] Connected to {host}:{port}");
        Ok(())
    }

    /// TCP connect + TLS handshake (without the outer timeout).
    async fn handshake(
        &self,
        host: &str,
        port: u16,
    ) -> Result<TlsStream<TcpStream>, ConnectionError> {
        let tcp = TcpStream::connect((host, port)).await?;

        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| ConnectionError::HandshakeFailed(format!("invalid server name: {e}")))?;

        let connector = TlsConnector::from(Arc::clone(&self.config.tls.config));
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))
    }

    /// Write an encoded frame to the gateway.
    ///
    /// Returns once the whole buffer is handed to the transport (partial
    /// writes are retried internally by `write_all`). Sends issued while
    /// connected go out in call order.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] when there is no live
    /// connection (the bytes are not buffered), or
    /// [`ConnectionError::TransportReset`] if the write fails; the
    /// connection is then disconnected and disconnect subscribers are
    /// notified.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let writer = self.writer.as_mut().ok_or(ConnectionError::NotConnected)?;

        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            log::error!("[Gateway] Write failed: {e}");
            self.teardown();
            notify_disconnect(&self.shared, DisconnectReason::Transport(e.to_string()));
            return Err(ConnectionError::TransportReset(e));
        }

        Ok(())
    }

    /// Encode and send a single notification.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConnection::send`].
    pub async fn send_notification(
        &mut self,
        notification: &Notification,
    ) -> Result<(), ConnectionError> {
        self.send(&notification.encode()).await
    }

    /// Send a multi-notification batch frame.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConnection::send`].
    pub async fn send_batch(&mut self, batch: &NotificationBatch) -> Result<(), ConnectionError> {
        self.send(batch.as_bytes()).await
    }

    /// Close the connection. Idempotent. In-flight writes are discarded
    /// without waiting for the peer.
    pub fn disconnect(&mut self) {
        let was_connected = self.state() != ConnectionState::Disconnected;
        self.teardown();
        if was_connected {
            notify_disconnect(&self.shared, DisconnectReason::Local);
            log::info!("[Gateway] Disconnected");
        }
    }

    /// Drop the socket halves and stop the read task, leaving the state
    /// `Disconnected`. Does not notify listeners.
    fn teardown(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.writer = None;
        lock(&self.shared).state = ConnectionState::Disconnected;
    }

    /// Read loop: decodes 6-byte error responses and fans them out.
    async fn read_loop(mut reader: ReadHalf<TlsStream<TcpStream>>, shared: Arc<Mutex<Shared>>) {
        let mut decoder = ResponseDecoder::new();
        let mut buf = [0u8; 1024];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    log::info!("[Gateway] Connection closed by gateway");
                    notify_disconnect(&shared, DisconnectReason::Eof);
                    break;
                }
                Ok(n) => match decoder.feed(&buf[..n]) {
                    Ok(responses) => {
                        for response in responses {
                            dispatch_response(&shared, response);
                        }
                    }
                    Err(e) => {
                        log::error!("[Gateway] Response decode error: {e}");
                        notify_disconnect(&shared, DisconnectReason::Decode(e.to_string()));
                        break;
                    }
                },
                // The gateway slams the socket shut without a TLS
                // close_notify; rustls reports that as UnexpectedEof.
                // Treat it like a clean close, not a transport fault.
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    log::info!("[Gateway] Connection closed by gateway without close_notify");
                    notify_disconnect(&shared, DisconnectReason::Eof);
                    break;
                }
                Err(e) => {
                    log::error!("[Gateway] Read error: {e}");
                    notify_disconnect(&shared, DisconnectReason::Transport(e.to_string()));
                    break;
                }
            }
        }
    }
}

impl Drop for GatewayConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

/// Deliver a response to every subscriber in subscription order. A closed
/// channel (dropped receiver) is pruned without aborting the loop.
fn dispatch_response(shared: &Mutex<Shared>, response: ErrorResponse) {
    log::debug!(
        "[Gateway] Error response: status={} identifier={}",
        response.status,
        response.identifier
    );
    lock(shared).response_listeners.retain(|tx| {
        let delivered = tx.send(response).is_ok();
        if !delivered {
            log::warn!("[Gateway] Dropping closed response listener");
        }
        delivered
    });
}

/// Mark the connection dead and tell disconnect subscribers why.
fn notify_disconnect(shared: &Mutex<Shared>, reason: DisconnectReason) {
    let mut guard = lock(shared);
    guard.state = ConnectionState::Disconnected;
    guard
        .disconnect_listeners
        .retain(|tx| tx.send(reason.clone()).is_ok());
}
