//! Physical MQTT Transport
//!
//! Trait seam between shared connections and the MQTT client that owns the
//! socket. A [`Dialer`] spawns the session and hands back a handle plus an
//! event stream; dialing never fails synchronously - connect and auth
//! failures arrive as [`TransportEvent::Error`] on the stream.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

mod rumqtt;

#[cfg(test)]
pub(crate) mod mock;

pub use rumqtt::RumqttDialer;

/// Options applied when dialing a broker.
///
/// Shared by every owner of one connection; there is no per-owner override.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Broker URL, e.g. `mqtt://broker.example.com:1883`
    pub broker_url: String,
    /// Broker-level client identifier
    pub client_id: Arc<str>,
    /// Username for broker auth
    pub username: String,
    /// Password for broker auth
    pub password: String,
    /// Keep alive interval
    pub keepalive: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Capacity of the transport event channel
    pub event_channel_capacity: usize,
}

/// Error type for transport operations
#[derive(Debug)]
pub enum TransportError {
    /// Broker URL could not be parsed
    InvalidUrl(String),
    /// Session is not established
    NotConnected,
    /// Request could not be handed to the client task
    RequestFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidUrl(url) => write!(f, "invalid broker url: {}", url),
            TransportError::NotConnected => write!(f, "transport not connected"),
            TransportError::RequestFailed(msg) => write!(f, "transport request failed: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Observable status of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// Dialing or waiting for the broker's session acknowledgement
    Connecting,
    /// Session established
    Connected,
    /// Session dropped; a reconnect may be requested
    Disconnected,
    /// Graceful close in progress
    Disconnecting,
}

/// Events emitted by a transport over its stream.
///
/// The stream closing means the physical close has completed and the
/// transport will emit nothing further.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Session acknowledged by the broker
    Connected,
    /// Re-establishment started after a drop
    Reconnecting,
    /// Socket closed by the broker or the network
    Closed,
    /// Transport shut down on request
    Ended,
    /// Connect, auth or protocol failure
    Error(String),
    /// Inbound publish
    Message { topic: String, payload: Bytes },
}

/// One physical MQTT session.
///
/// Owners never hold this directly; they go through their shared
/// [`Connection`](crate::connection::Connection).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Current session status.
    fn status(&self) -> TransportStatus;

    /// Publish a message through the session.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribe to a topic filter on the session.
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Resume a session that dropped. No-op while connected.
    fn reconnect(&self);

    /// Close the session. `force` skips the graceful DISCONNECT exchange.
    /// Fire-and-forget: completion is observed as the event stream closing.
    fn end(&self, force: bool);
}

/// Factory for transports.
///
/// `dial` returns immediately; connection establishment is asynchronous and
/// observed through the returned event stream.
pub trait Dialer: Send + Sync {
    fn dial(
        &self,
        options: TransportOptions,
    ) -> (Arc<dyn Transport>, mpsc::Receiver<TransportEvent>);
}
