use std::sync::Arc;

use crate::{
    config::BridgeSettings,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};
use super::bridge::Bridge;

/// Builder for constructing a [`Bridge`] with optional subscribers.
pub struct BridgeBuilder {
    settings: BridgeSettings,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl BridgeBuilder {
    /// Creates a new builder with the given tunables.
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (connection lifecycle, calls, shutdown)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the bridge and starts forwarding bus events to the subscribers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Bridge {
        let bus = Bus::new(self.settings.bus_capacity);
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        Bridge::new_internal(self.settings, bus, subs)
    }
}
