//! Connection Registry
//!
//! Keyed lookup and creation of shared connections. Owned by whatever
//! composes the system (typically the flow-host adapter); there is no
//! hidden process-global instance.
//!
//! The cache key is `(broker_url, client_id)`, so the same device identity
//! against two different brokers yields two independent sessions.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::MqttConfig;
use crate::connection::{Connection, Identity};
use crate::status::StatusSink;
use crate::transport::{Dialer, RumqttDialer};


/// Cache key of one shared connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub broker_url: String,
    pub client_id: Arc<str>,
}

impl ConnectionKey {
    pub fn new(broker_url: &str, client_id: &str) -> Self {
        Self {
            broker_url: broker_url.to_string(),
            client_id: Arc::from(client_id),
        }
    }
}

/// Registry of live shared connections.
///
/// A key is present if and only if its connection still has (or is about
/// to get) owners; release paths prune entries whose owner set emptied.
///
/// Connections handed out spawn their event dispatch task on the ambient
/// tokio runtime, so [`Connection::connect`] must be called from runtime
/// context.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionKey, Arc<Connection>>,
    config: MqttConfig,
    dialer: Arc<dyn Dialer>,
    status_sink: Option<Arc<dyn StatusSink>>,
}

impl ConnectionRegistry {
    /// Registry dialing real rumqttc sessions.
    pub fn new(config: MqttConfig) -> Self {
        Self::with_dialer(config, Arc::new(RumqttDialer))
    }

    /// Registry with a custom transport factory.
    pub fn with_dialer(config: MqttConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            connections: DashMap::new(),
            config,
            dialer,
            status_sink: None,
        }
    }

    /// Observe state transitions of every connection handed out.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    /// Return the cached connection for this broker and identity, creating
    /// one when absent. Does not dial: callers still attach with
    /// [`Connection::connect`].
    pub fn use_connection(&self, broker_url: &str, identity: Identity) -> Arc<Connection> {
        let key = ConnectionKey {
            broker_url: broker_url.to_string(),
            client_id: identity.client_id.clone(),
        };

        if let Some(existing) = self.connections.get(&key) {
            debug!(client_id = %key.client_id, "reusing cached connection");
            return existing.clone();
        }

        info!(client_id = %key.client_id, url = broker_url, "caching new connection");
        let connection = Arc::new(Connection::new(
            broker_url,
            identity,
            &self.config,
            self.dialer.clone(),
            self.status_sink.clone(),
        ));
        self.connections
            .entry(key)
            .or_insert(connection)
            .value()
            .clone()
    }

    /// Release one owner's hold on the keyed connection, pruning the entry
    /// when the owner set empties. Unknown keys are a logged no-op:
    /// teardown ordering races in a dynamic topology are benign.
    pub fn release(&self, subscriber_id: &str, key: &ConnectionKey) {
        let Some(connection) = self.connections.get(key).map(|e| e.value().clone()) else {
            debug!(
                subscriber = subscriber_id,
                client_id = %key.client_id,
                "release: connection not found"
            );
            return;
        };
        if connection.disconnect(subscriber_id) {
            self.connections.remove(key);
            info!(client_id = %key.client_id, "connection removed");
        }
    }

    /// Release the hold announced by the device-identity owner, looked up
    /// by client id alone. Callback detach is deferred until the close
    /// completes. Unknown client ids are a logged no-op.
    pub fn disconnect_from_output_node(&self, subscriber_id: &str, client_id: &str) {
        let keys: Vec<ConnectionKey> = self
            .connections
            .iter()
            .filter(|entry| entry.key().client_id.as_ref() == client_id)
            .map(|entry| entry.key().clone())
            .collect();

        if keys.is_empty() {
            debug!(
                subscriber = subscriber_id,
                client_id, "disconnect: connection not found"
            );
            return;
        }

        for key in keys {
            let Some(connection) = self.connections.get(&key).map(|e| e.value().clone()) else {
                continue;
            };
            if connection.disconnect_deferred(subscriber_id) {
                self.connections.remove(&key);
                info!(client_id = %key.client_id, "connection removed");
            }
        }
    }

    /// Release one owner's hold on every live connection, used when a
    /// shared uplink node multiplexing many devices goes away.
    pub fn disconnect_all(&self, subscriber_id: &str) {
        debug!(subscriber = subscriber_id, "releasing all connections");

        // collect keys first so removal does not race the iterator
        let keys: Vec<ConnectionKey> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys {
            self.release(subscriber_id, &key);
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Whether a connection is cached for this key.
    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.connections.contains_key(key)
    }
}
