//! rumqttc-backed Transport
//!
//! Runs one rumqttc event loop per dialed session on a tokio task and maps
//! its events onto the transport event stream. After a poll failure the
//! task parks with the socket dropped until an owner requests a reconnect
//! or the session is ended, so errors never leave a half-open socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use rumqttc::{AsyncClient, Event as MqttEvent, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Dialer, Transport, TransportError, TransportEvent, TransportOptions, TransportStatus};

/// Request channel capacity of the rumqttc client
const CLIENT_CHANNEL_CAPACITY: usize = 64;

/// Dialer producing rumqttc sessions.
pub struct RumqttDialer;

impl Dialer for RumqttDialer {
    fn dial(
        &self,
        options: TransportOptions,
    ) -> (Arc<dyn Transport>, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(options.event_channel_capacity.max(1));

        let (host, port) = match parse_broker_url(&options.broker_url) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(url = %options.broker_url, "refusing to dial: {}", e);
                tokio::spawn(async move {
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    let _ = event_tx.send(TransportEvent::Ended).await;
                });
                let dead = RumqttTransport {
                    client: None,
                    status: Arc::new(RwLock::new(TransportStatus::Disconnected)),
                    cancel: CancellationToken::new(),
                    resume: Arc::new(Notify::new()),
                };
                return (Arc::new(dead), event_rx);
            }
        };

        let mut mqtt_options = MqttOptions::new(options.client_id.as_ref(), host, port);
        mqtt_options
            .set_credentials(options.username.clone(), options.password.clone())
            .set_keep_alive(options.keepalive);

        let (client, event_loop) = AsyncClient::new(mqtt_options, CLIENT_CHANNEL_CAPACITY);

        let status = Arc::new(RwLock::new(TransportStatus::Connecting));
        let cancel = CancellationToken::new();
        let resume = Arc::new(Notify::new());

        tokio::spawn(poll_loop(
            event_loop,
            event_tx,
            options.client_id.clone(),
            options.connect_timeout,
            status.clone(),
            cancel.clone(),
            resume.clone(),
        ));

        let transport = RumqttTransport {
            client: Some(client),
            status,
            cancel,
            resume,
        };

        (Arc::new(transport), event_rx)
    }
}

/// Transport handle over a running rumqttc session.
struct RumqttTransport {
    /// None when the broker URL never parsed
    client: Option<AsyncClient>,
    /// Shared with the poll task, which owns the transitions
    status: Arc<RwLock<TransportStatus>>,
    cancel: CancellationToken,
    resume: Arc<Notify>,
}

#[async_trait]
impl Transport for RumqttTransport {
    fn status(&self) -> TransportStatus {
        *self.status.read()
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))
    }

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))
    }

    fn reconnect(&self) {
        self.resume.notify_one();
    }

    fn end(&self, force: bool) {
        *self.status.write() = TransportStatus::Disconnecting;
        if !force {
            if let Some(client) = self.client.as_ref() {
                // best-effort DISCONNECT before the loop is cancelled
                let _ = client.try_disconnect();
            }
        }
        self.cancel.cancel();
    }
}

async fn poll_loop(
    mut event_loop: EventLoop,
    tx: mpsc::Sender<TransportEvent>,
    client_id: Arc<str>,
    connect_timeout: Duration,
    status: Arc<RwLock<TransportStatus>>,
    cancel: CancellationToken,
    resume: Arc<Notify>,
) {
    let mut closed_sent = false;

    'session: loop {
        // while no session is acknowledged, cap how long one poll may take
        let connecting = *status.read() == TransportStatus::Connecting;

        let polled = tokio::select! {
            biased;

            _ = cancel.cancelled() => break 'session,

            polled = async {
                if connecting {
                    match timeout(connect_timeout, event_loop.poll()).await {
                        Ok(polled) => polled,
                        Err(_) => Err(rumqttc::ConnectionError::NetworkTimeout),
                    }
                } else {
                    event_loop.poll().await
                }
            } => polled,
        };

        match polled {
            Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                debug!(client_id = %client_id, "session acknowledged");
                *status.write() = TransportStatus::Connected;
                closed_sent = false;
                if tx.send(TransportEvent::Connected).await.is_err() {
                    break 'session;
                }
            }
            Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                let message = TransportEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if tx.send(message).await.is_err() {
                    break 'session;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(client_id = %client_id, "session dropped: {}", e);
                *status.write() = TransportStatus::Disconnected;
                let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                let _ = tx.send(TransportEvent::Closed).await;
                closed_sent = true;

                // park until an owner asks for a reconnect; the next
                // poll re-dials the broker
                tokio::select! {
                    _ = cancel.cancelled() => break 'session,
                    _ = resume.notified() => {
                        debug!(client_id = %client_id, "resuming session");
                        *status.write() = TransportStatus::Connecting;
                        if tx.send(TransportEvent::Reconnecting).await.is_err() {
                            break 'session;
                        }
                    }
                }
            }
        }
    }

    *status.write() = TransportStatus::Disconnected;
    if !closed_sent {
        let _ = tx.send(TransportEvent::Closed).await;
    }
    let _ = tx.send(TransportEvent::Ended).await;
    debug!(client_id = %client_id, "session task finished");
    // tx drops here; the closed stream tells the connection the physical
    // close has completed
}

/// Parse `mqtt://host:port`, `tcp://host:port` or bare `host[:port]`.
fn parse_broker_url(url: &str) -> Result<(String, u16), TransportError> {
    let rest = if let Some(stripped) = url.strip_prefix("mqtt://") {
        stripped
    } else if let Some(stripped) = url.strip_prefix("tcp://") {
        stripped
    } else if url.contains("://") {
        return Err(TransportError::InvalidUrl(url.to_string()));
    } else {
        url
    };

    let mut parts = rest.splitn(2, ':');
    let host = match parts.next() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(TransportError::InvalidUrl(url.to_string())),
    };
    let port = match parts.next() {
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| TransportError::InvalidUrl(url.to_string()))?,
        None => 1883,
    };

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::parse_broker_url;

    #[test_case("mqtt://broker.example.com:8883", "broker.example.com", 8883)]
    #[test_case("tcp://10.0.0.1:1883", "10.0.0.1", 1883)]
    #[test_case("broker.example.com:1884", "broker.example.com", 1884)]
    #[test_case("broker.example.com", "broker.example.com", 1883)]
    fn parses_supported_urls(url: &str, host: &str, port: u16) {
        let (parsed_host, parsed_port) = parse_broker_url(url).unwrap();
        assert_eq!(parsed_host, host);
        assert_eq!(parsed_port, port);
    }

    #[test_case("wss://broker.example.com:443")]
    #[test_case("mqtt://:1883")]
    #[test_case("mqtt://host:notaport")]
    fn rejects_unsupported_urls(url: &str) {
        assert!(parse_broker_url(url).is_err());
    }
}
