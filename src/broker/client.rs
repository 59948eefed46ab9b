//! Broker client seam.
//!
//! [`StatusPublisher`](crate::StatusPublisher) only needs to hand a QoS 1 message to the
//! client and to request a clean disconnect; packet identifiers and acknowledgements come
//! back through the connection driver and the [`AckGate`](super::AckGate).

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use crate::error::PublishError;

/// Outgoing half of a broker connection.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Queues a QoS 1 publish.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), PublishError>;

    /// Requests a clean disconnect.
    async fn disconnect(&self) -> Result<(), PublishError>;
}

#[async_trait]
impl BrokerClient for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), PublishError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| PublishError::Client(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        AsyncClient::disconnect(self)
            .await
            .map_err(|e| PublishError::Client(e.to_string()))
    }
}
