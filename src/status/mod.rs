//! Connection Status
//!
//! Observable state machine of a shared connection plus the host-facing
//! indicator mapping (color and label) an adapter shows next to the node
//! that owns the connection.

use std::collections::HashMap;
use std::fmt;


/// State of a shared connection as observed by its owners.
///
/// Transitions: `NotConnected -> Connecting -> Connected`, with
/// `Connected <-> Connecting` on reconnects, `-> Disconnected` on close or
/// end, and `-> Error` on transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No dial attempted yet
    #[default]
    NotConnected,
    /// Dialing or re-establishing the session
    Connecting,
    /// Session live
    Connected,
    /// Session closed
    Disconnected,
    /// Transport failure; awaiting a fresh connect
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "not-connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator color understood by flow hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green,
    Grey,
    Red,
    Yellow,
}

/// Display indicator for one connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    pub color: StatusColor,
    pub text: &'static str,
}

/// Mapping of connection states to display indicators.
///
/// Hosts can register their own indicators; `with_defaults` matches the
/// usual flow-editor palette.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    indicators: HashMap<ConnectionState, StatusIndicator>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            ConnectionState::Connected,
            StatusIndicator {
                color: StatusColor::Green,
                text: "connected",
            },
        );
        registry.register(
            ConnectionState::Connecting,
            StatusIndicator {
                color: StatusColor::Yellow,
                text: "connecting",
            },
        );
        registry.register(
            ConnectionState::Disconnected,
            StatusIndicator {
                color: StatusColor::Red,
                text: "disconnected",
            },
        );
        registry.register(
            ConnectionState::Error,
            StatusIndicator {
                color: StatusColor::Red,
                text: "error",
            },
        );
        registry.register(
            ConnectionState::NotConnected,
            StatusIndicator {
                color: StatusColor::Grey,
                text: "not connected",
            },
        );
        registry
    }

    pub fn register(&mut self, state: ConnectionState, indicator: StatusIndicator) {
        self.indicators.insert(state, indicator);
    }

    pub fn get(&self, state: ConnectionState) -> Option<&StatusIndicator> {
        self.indicators.get(&state)
    }
}

/// Sink a host adapter implements to observe state transitions.
pub trait StatusSink: Send + Sync {
    fn state_changed(&self, client_id: &str, state: ConnectionState);
}
