//! Fan-out of log records to whoever is watching the runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{LogEnvelope, LogRecord};

/// Records buffered per subscriber before a slow one starts lagging.
const DEFAULT_CAPACITY: usize = 1000;

/// The runtime's logging collaborator.
///
/// Cloning is cheap and every clone feeds the same subscribers. Subscribers
/// only see records published after they subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LogEnvelope>,
    published: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how many subscribers got the envelope; with none attached the
    /// record is counted and discarded.
    pub fn publish(&self, envelope: LogEnvelope) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(envelope).unwrap_or(0)
    }

    pub fn publish_record(&self, record: LogRecord) -> usize {
        self.publish(LogEnvelope::new(record))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Records published since creation, delivered or not.
    pub fn event_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.event_count())
            .finish()
    }
}
