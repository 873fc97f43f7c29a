//! Event publishing for subscriptions.
//!
//! Handlers publish through a [`Publisher`]; the matching [`EventStream`] is
//! drained by the subscription registry, which fans each event out to the
//! registrations on its root field.

use serde_json::Value;
use tokio::sync::mpsc;

/// An event for one subscription root field.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub root_field: String,
    pub payload: Value,
}

/// Sending half. Cheap to clone and never blocks.
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: mpsc::UnboundedSender<PublishedEvent>,
}

impl Publisher {
    /// Queues `payload` as the next value of `root_field`.
    ///
    /// Returns false once the event stream has been dropped.
    pub fn publish(&self, root_field: impl Into<String>, payload: Value) -> bool {
        let event = PublishedEvent {
            root_field: root_field.into(),
            payload,
        };
        self.sender.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<PublishedEvent>,
}

impl EventStream {
    /// Waits for the next event. `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<PublishedEvent> {
        self.receiver.recv().await
    }
}

/// Creates a connected publisher and event stream.
pub fn channel() -> (Publisher, EventStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Publisher { sender }, EventStream { receiver })
}
