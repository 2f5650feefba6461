//! The transport contract.
//!
//! The client never speaks a wire protocol itself. A [`ConnectionFactory`]
//! produces a connected [`Transport`], and every subscribe, unsubscribe and
//! disconnect is a round-trip that resolves once the transport has confirmed
//! it. Inbound messages are delivered by the transport's own background
//! machinery, which calls the registered [`MessageHandler`]s.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery guarantee negotiated for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery; duplicates possible.
    AtLeastOnce,
    /// Exactly-once handshake.
    ExactlyOnce,
}

impl std::fmt::Display for QoS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QoS::AtMostOnce => write!(f, "at_most_once"),
            QoS::AtLeastOnce => write!(f, "at_least_once"),
            QoS::ExactlyOnce => write!(f, "exactly_once"),
        }
    }
}

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote side refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The transport has no live session.
    #[error("not connected")]
    NotConnected,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Receives messages delivered on a subscribed topic.
///
/// Called from the transport's delivery task, concurrently with whatever the
/// subscribing task is doing. Implementations must not block.
pub trait MessageHandler: Send + Sync {
    /// Handle one inbound message.
    fn on_message(&self, topic: &str, payload: &Bytes);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &Bytes) + Send + Sync,
{
    fn on_message(&self, topic: &str, payload: &Bytes) {
        self(topic, payload)
    }
}

/// A handler that logs every delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    fn on_message(&self, topic: &str, payload: &Bytes) {
        tracing::info!(
            topic,
            payload = %String::from_utf8_lossy(payload),
            "received event"
        );
    }
}

/// Notifications about the health of a live session.
pub trait ConnectionEvents: Send + Sync {
    /// The session was lost unexpectedly. The transport may reconnect on its own.
    fn on_interrupted(&self, error: &TransportError) {
        tracing::warn!(error = %error, "connection interrupted");
    }

    /// An interrupted session was re-established.
    fn on_resumed(&self, return_code: u8, session_present: bool) {
        tracing::info!(return_code, session_present, "connection resumed");
    }
}

/// Connection events that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingConnectionEvents;

impl ConnectionEvents for LoggingConnectionEvents {}

/// Everything a factory needs to open a session.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Broker endpoint.
    pub endpoint: String,
    /// Client certificate file.
    pub cert_path: PathBuf,
    /// Client private key file.
    pub key_path: PathBuf,
    /// Certificate authority file.
    pub ca_path: PathBuf,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Whether the broker should discard session state on connect.
    pub clean_session: bool,
    /// Sink for interruption and resumption notifications.
    pub events: Arc<dyn ConnectionEvents>,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("endpoint", &self.endpoint)
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("ca_path", &self.ca_path)
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .finish_non_exhaustive()
    }
}

/// A live publish-subscribe session.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Subscribe `handler` to `topic`. Resolves with the granted QoS once confirmed.
    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<QoS, TransportError>;

    /// Stop delivery for `topic`. Resolves once confirmed.
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Close the session. Resolves once disconnected.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Opens sessions.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// The transport produced by this factory.
    type Transport: Transport;

    /// Connect and resolve once the session is confirmed.
    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Transport, TransportError>;
}
