//! Scripted in-memory transport for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::{Dialer, Transport, TransportError, TransportEvent, TransportOptions, TransportStatus};

pub(crate) struct MockTransport {
    status: RwLock<TransportStatus>,
    /// Dropped to signal close completion
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    /// When false, `end` leaves the stream open until `complete_close`
    auto_complete_close: RwLock<bool>,
    pub reconnect_calls: AtomicUsize,
    pub end_calls: AtomicUsize,
    pub published: Mutex<Vec<(String, Bytes)>>,
    pub subscribed: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            status: RwLock::new(TransportStatus::Connecting),
            events: Mutex::new(Some(events)),
            auto_complete_close: RwLock::new(true),
            reconnect_calls: AtomicUsize::new(0),
            end_calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: TransportStatus) {
        *self.status.write() = status;
    }

    pub fn hold_close_open(&self) {
        *self.auto_complete_close.write() = false;
    }

    /// Push an event at the connection, as the broker would.
    pub fn emit(&self, event: TransportEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            tx.try_send(event).expect("event channel full or closed");
        }
    }

    pub fn emit_connected(&self) {
        self.set_status(TransportStatus::Connected);
        self.emit(TransportEvent::Connected);
    }

    pub fn emit_message(&self, topic: &str, payload: &[u8]) {
        self.emit(TransportEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
        });
    }

    /// Finish a pending close: emit the tail events and drop the stream.
    pub fn complete_close(&self) {
        self.set_status(TransportStatus::Disconnected);
        self.emit(TransportEvent::Closed);
        self.emit(TransportEvent::Ended);
        self.events.lock().take();
    }

    pub fn end_count(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn status(&self) -> TransportStatus {
        *self.status.read()
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        if *self.status.read() != TransportStatus::Connected {
            return Err(TransportError::NotConnected);
        }
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.subscribed.lock().push(filter.to_string());
        Ok(())
    }

    fn reconnect(&self) {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.set_status(TransportStatus::Connecting);
    }

    fn end(&self, _force: bool) {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        if *self.status.read() == TransportStatus::Disconnected {
            return;
        }
        self.set_status(TransportStatus::Disconnecting);
        if *self.auto_complete_close.read() {
            self.complete_close();
        }
    }
}

#[derive(Default)]
pub(crate) struct MockDialer {
    pub dials: AtomicUsize,
    transports: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.transports.lock()[index].clone()
    }

    pub fn last_transport(&self) -> Arc<MockTransport> {
        self.transports
            .lock()
            .last()
            .expect("no transport dialed")
            .clone()
    }
}

impl Dialer for MockDialer {
    fn dial(
        &self,
        options: TransportOptions,
    ) -> (Arc<dyn Transport>, mpsc::Receiver<TransportEvent>) {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(options.event_channel_capacity.max(16));
        let transport = Arc::new(MockTransport::new(tx));
        self.transports.lock().push(transport.clone());
        (transport, rx)
    }
}
