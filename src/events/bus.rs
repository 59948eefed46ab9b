//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. The broker driver, the signaling backend,
//! the call translator and the orchestrator publish; the orchestrator's listener is the
//! single consumer and fans events out to the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//! Publishers (many):                  Subscriber (one):
//!   broker driver ──┐
//!   signaling     ──┼──────► Bus ───► Bridge listener ────► SubscriberSet
//!   translator    ──┤  (broadcast)
//!   bridge        ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; events without receivers are dropped.
//! - Capacity is shared across receivers; laggards observe `RecvError::Lagged(n)`.
//! - Nothing on the bus drives control flow: it is an observability channel.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}
