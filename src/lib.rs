//! Edgemux - Shared MQTT connection multiplexer for IoT edge integrations
//!
//! Lets many logical owners (flow nodes, tasks, device integrations) share
//! physical MQTT connections to a cloud IoT platform. Connections are
//! reference counted per device identity: the first owner dials the broker,
//! later owners reuse the live session, and the socket is torn down when the
//! last owner detaches.

pub mod config;
pub mod connection;
pub mod event;
pub mod host;
pub mod registry;
pub mod status;
pub mod topic;
pub mod transport;

pub use config::Config;
pub use connection::{Connection, ConnectionError, Identity};
pub use event::{Event, EventCallback, EventKind, Payload};
pub use host::{release_shared_link, FlowLookup};
pub use registry::{ConnectionKey, ConnectionRegistry};
pub use status::{ConnectionState, StatusIndicator, StatusRegistry, StatusSink};
pub use topic::TopicBuilder;
pub use transport::{
    Dialer, Transport, TransportError, TransportEvent, TransportOptions, TransportStatus,
};
