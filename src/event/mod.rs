//! Connection Event Model
//!
//! The closed set of event kinds a shared connection fans out to its
//! owners, and the payload decoding rules for inbound messages.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;


/// Kind of event an owner can subscribe to on a shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Session established with the broker
    Connect,
    /// Session re-establishment started after a drop
    Reconnect,
    /// Underlying socket closed
    Close,
    /// Session ended for good (last owner detached)
    End,
    /// Transport-level failure (auth, network)
    Error,
    /// Inbound publish from the broker
    Message,
}

impl EventKind {
    /// All event kinds, in a stable order.
    pub const ALL: [EventKind; 6] = [
        EventKind::Connect,
        EventKind::Reconnect,
        EventKind::Close,
        EventKind::End,
        EventKind::Error,
        EventKind::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Reconnect => "reconnect",
            EventKind::Close => "close",
            EventKind::End => "end",
            EventKind::Error => "error",
            EventKind::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded payload of an inbound message.
///
/// Platform messages are usually JSON, but a message that does not parse
/// is delivered as raw text rather than dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured body
    Json(Value),
    /// Fallback for bodies that are not valid JSON
    Text(String),
}

impl Payload {
    /// Decode a message body, falling back to raw text on parse failure.
    pub fn decode(raw: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(raw) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(String::from_utf8_lossy(raw).into_owned()),
        }
    }
}

/// Event delivered to owner callbacks.
#[derive(Debug, Clone)]
pub enum Event {
    Connect,
    Reconnect,
    Close,
    End,
    /// Transport error description
    Error(String),
    /// Inbound publish
    Message { topic: String, payload: Payload },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connect => EventKind::Connect,
            Event::Reconnect => EventKind::Reconnect,
            Event::Close => EventKind::Close,
            Event::End => EventKind::End,
            Event::Error(_) => EventKind::Error,
            Event::Message { .. } => EventKind::Message,
        }
    }
}

/// Callback invoked on the connection's dispatch task. Must not block.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;
