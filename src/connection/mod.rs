//! Shared MQTT Connection
//!
//! One physical MQTT session shared by many logical owners. Owners attach
//! with [`Connection::connect`], register per-event callbacks, and detach
//! with [`Connection::disconnect`]; the socket is dialed once on first
//! attach and closed when the last owner leaves.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::event::{Event, EventCallback, EventKind, Payload};
use crate::status::{ConnectionState, StatusSink};
use crate::transport::{
    Dialer, Transport, TransportError, TransportEvent, TransportOptions, TransportStatus,
};

mod fanout;


pub use fanout::EventFanout;

/// Broker identity of one device connection.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Broker-level MQTT client identifier
    pub client_id: Arc<str>,
    pub username: String,
    pub password: String,
}

/// Error type for connection operations
#[derive(Debug)]
pub enum ConnectionError {
    /// No transport dialed for this connection yet
    NotConnected,
    /// Underlying transport refused the operation
    Transport(TransportError),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::NotConnected => write!(f, "connection has no live transport"),
            ConnectionError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<TransportError> for ConnectionError {
    fn from(e: TransportError) -> Self {
        ConnectionError::Transport(e)
    }
}

/// One shared MQTT session.
///
/// All operations are non-blocking; connection establishment and teardown
/// are observed through the registered event callbacks.
pub struct Connection {
    broker_url: String,
    identity: Identity,
    keepalive: Duration,
    connect_timeout: Duration,
    event_channel_capacity: usize,
    dialer: Arc<dyn Dialer>,
    state: RwLock<ConnectionState>,
    status_sink: Option<Arc<dyn StatusSink>>,
    subscribers: Mutex<HashSet<Arc<str>>>,
    fanout: EventFanout,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    /// Owners whose listeners are detached only once the close completes
    deferred_detach: Mutex<Vec<Arc<str>>>,
}

impl Connection {
    pub fn new(
        broker_url: &str,
        identity: Identity,
        config: &MqttConfig,
        dialer: Arc<dyn Dialer>,
        status_sink: Option<Arc<dyn StatusSink>>,
    ) -> Self {
        Self {
            broker_url: broker_url.to_string(),
            identity,
            keepalive: config.keepalive,
            connect_timeout: config.connect_timeout,
            event_channel_capacity: config.event_channel_capacity,
            dialer,
            state: RwLock::new(ConnectionState::NotConnected),
            status_sink,
            subscribers: Mutex::new(HashSet::new()),
            fanout: EventFanout::new(),
            transport: Mutex::new(None),
            deferred_detach: Mutex::new(Vec::new()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.identity.client_id
    }

    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_idle(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn fanout(&self) -> &EventFanout {
        &self.fanout
    }

    /// Attach an owner. Dials the broker on first attach; requests a
    /// reconnect when the transport exists but its session dropped. An
    /// attach landing while a close is in flight is honored with a fresh
    /// dial once the close completes.
    ///
    /// Never blocks and never fails synchronously: connect and auth
    /// failures arrive through the owner's `Error` callback.
    ///
    /// Must be called from within a tokio runtime; the transport's event
    /// stream is drained on a spawned task.
    pub fn connect(self: &Arc<Self>, subscriber_id: &str) {
        self.subscribers.lock().insert(Arc::from(subscriber_id));
        debug!(
            client_id = %self.identity.client_id,
            subscriber = subscriber_id,
            subscribers = self.subscriber_count(),
            "attach"
        );

        let mut transport = self.transport.lock();
        match transport.as_ref() {
            None => {
                info!(client_id = %self.identity.client_id, url = %self.broker_url, "dialing");
                self.set_state(ConnectionState::Connecting);
                let (handle, events) = self.dialer.dial(self.transport_options());
                *transport = Some(handle);
                self.spawn_dispatch(events);
            }
            Some(handle) => match handle.status() {
                TransportStatus::Disconnected | TransportStatus::Disconnecting => {
                    debug!(client_id = %self.identity.client_id, "stale session, reconnecting");
                    self.set_state(ConnectionState::Connecting);
                    handle.reconnect();
                }
                TransportStatus::Connecting | TransportStatus::Connected => {}
            },
        }
    }

    /// Register `callback` for `kind` under `subscriber_id`.
    ///
    /// Registering the same pair twice attaches a second listener; the
    /// callback then fires once per attachment for every matching event.
    pub fn subscribe(&self, kind: EventKind, subscriber_id: &str, callback: EventCallback) {
        self.fanout.register(Arc::from(subscriber_id), kind, callback);
    }

    /// Detach an owner and its callbacks. Closes the transport when the
    /// owner set empties. Idempotent for ids that already left.
    ///
    /// Returns true when this call released the last owner.
    pub fn disconnect(&self, subscriber_id: &str) -> bool {
        let last = self.detach(subscriber_id);
        self.fanout.remove_owner(subscriber_id);
        if last {
            self.close_transport();
        }
        last
    }

    /// Detach the owner that announced the device identity.
    ///
    /// Same refcount decrement as [`disconnect`](Self::disconnect), but the
    /// owner's callbacks stay attached until the physical close completes,
    /// so the close sequence never fires against a removed handler.
    pub fn disconnect_deferred(&self, subscriber_id: &str) -> bool {
        let last = self.detach(subscriber_id);
        self.deferred_detach.lock().push(Arc::from(subscriber_id));
        if last {
            self.close_transport();
        }
        last
    }

    /// Publish through the shared session.
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ConnectionError> {
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or(ConnectionError::NotConnected)?;
        if let Err(e) = transport.publish(topic, payload).await {
            warn!(client_id = %self.identity.client_id, topic, "publish failed: {}", e);
            self.set_state(ConnectionState::Error);
            return Err(e.into());
        }
        Ok(())
    }

    /// Subscribe the shared session to a broker topic filter.
    pub async fn subscribe_topic(&self, filter: &str) -> Result<(), ConnectionError> {
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or(ConnectionError::NotConnected)?;
        transport.subscribe(filter).await?;
        Ok(())
    }

    fn detach(&self, subscriber_id: &str) -> bool {
        let mut subscribers = self.subscribers.lock();
        let removed = subscribers.remove(subscriber_id);
        let last = removed && subscribers.is_empty();
        drop(subscribers);
        debug!(
            client_id = %self.identity.client_id,
            subscriber = subscriber_id,
            removed,
            subscribers = self.subscriber_count(),
            "detach"
        );
        last
    }

    fn close_transport(&self) {
        let transport = self.transport.lock().clone();
        if let Some(handle) = transport {
            if handle.status() == TransportStatus::Disconnecting {
                return;
            }
            info!(client_id = %self.identity.client_id, "last owner left, closing session");
            handle.end(false);
        }
    }

    fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            broker_url: self.broker_url.clone(),
            client_id: self.identity.client_id.clone(),
            username: self.identity.username.clone(),
            password: self.identity.password.clone(),
            keepalive: self.keepalive,
            connect_timeout: self.connect_timeout,
            event_channel_capacity: self.event_channel_capacity,
        }
    }

    fn spawn_dispatch(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        let connection = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                connection.handle_transport_event(event);
            }
            connection.finish_close();
        });
    }

    fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.set_state(ConnectionState::Connected);
                self.fanout.dispatch(&Event::Connect);
            }
            TransportEvent::Reconnecting => {
                self.set_state(ConnectionState::Connecting);
                self.fanout.dispatch(&Event::Reconnect);
            }
            TransportEvent::Closed => {
                if self.state() != ConnectionState::Error {
                    self.set_state(ConnectionState::Disconnected);
                }
                self.fanout.dispatch(&Event::Close);
            }
            TransportEvent::Ended => {
                if self.state() != ConnectionState::Error {
                    self.set_state(ConnectionState::Disconnected);
                }
                self.fanout.dispatch(&Event::End);
            }
            TransportEvent::Error(message) => {
                // the transport has already dropped its socket by the time
                // the error surfaces, so no half-open session lingers
                warn!(client_id = %self.identity.client_id, "transport error: {}", message);
                self.set_state(ConnectionState::Error);
                self.fanout.dispatch(&Event::Error(message));
            }
            TransportEvent::Message { topic, payload } => {
                let payload = Payload::decode(&payload);
                self.fanout.dispatch(&Event::Message { topic, payload });
            }
        }
    }

    /// Runs when the transport event stream closes: the physical close has
    /// completed and deferred owners can be detached safely. Owners that
    /// attached while the close was in flight get a fresh transport dialed,
    /// since the old session can no longer be revived.
    fn finish_close(self: &Arc<Self>) {
        let deferred: Vec<Arc<str>> = self.deferred_detach.lock().drain(..).collect();
        for owner in &deferred {
            self.fanout.remove_owner(owner);
        }
        *self.transport.lock() = None;
        if self.state() != ConnectionState::Error {
            self.set_state(ConnectionState::Disconnected);
        }
        debug!(
            client_id = %self.identity.client_id,
            deferred = deferred.len(),
            "session closed"
        );

        // a failed session stays in Error until an owner reconnects
        // explicitly; only a clean close redials for waiting owners
        if self.state() == ConnectionState::Error {
            return;
        }
        let mut transport = self.transport.lock();
        if transport.is_some() || self.subscribers.lock().is_empty() {
            return;
        }
        info!(
            client_id = %self.identity.client_id,
            url = %self.broker_url,
            "owners attached during close, redialing"
        );
        self.set_state(ConnectionState::Connecting);
        let (handle, events) = self.dialer.dial(self.transport_options());
        *transport = Some(handle);
        drop(transport);
        self.spawn_dispatch(events);
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = {
            let mut current = self.state.write();
            let changed = *current != state;
            *current = state;
            changed
        };
        if changed {
            debug!(client_id = %self.identity.client_id, state = %state, "state");
            if let Some(sink) = self.status_sink.as_ref() {
                sink.state_changed(&self.identity.client_id, state);
            }
        }
    }
}
