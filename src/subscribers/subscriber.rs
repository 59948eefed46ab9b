//! # Event subscriber trait.
//!
//! Each subscriber gets a dedicated worker task fed by a bounded queue owned by
//! [`SubscriberSet`](crate::SubscriberSet). Panics are caught and reported as
//! `EventKind::SubscriberPanicked`; overflow drops the event for that subscriber only
//! and publishes `EventKind::SubscriberOverflow`.

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
