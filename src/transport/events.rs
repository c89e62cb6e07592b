//! Typed publish/subscribe for transport lifecycle and inbound frames.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::link::Frame;

/// Observable transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link dropped and a reconnect cycle has started.
    Reconnecting,
    /// The reconnect cycle succeeded; the link is open again.
    Reconnect,
    /// Every attempt in the reconnect cycle failed. Carries the last error.
    ReconnectFailed(String),
    /// Inbound frame, in wire-arrival order.
    Message(Frame),
    /// The transport was closed deliberately.
    Close,
}

/// Fan-out of [`TransportEvent`]s to any number of subscribers.
///
/// Each subscriber sees every event emitted after it subscribed, exactly once
/// and in emission order. Subscribers whose receiver was dropped are pruned on
/// the next emit.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>>,
}

impl EventBus {
    /// Register a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn emit(&self, event: &TransportEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last emit.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
