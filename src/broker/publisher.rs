//! # StatusPublisher: owns the broker connection.
//!
//! Arms the last-will before connecting, spawns the [connection driver](super::driver),
//! and offers the acknowledgement-gated [`publish`](StatusPublisher::publish) used for
//! both the retained status value and call events.
//!
//! ## Publish discipline
//! ```text
//! publish(topic, payload, retain)
//!   ├─ lock serial             (one publish in flight)
//!   ├─ gate.register()         → Ticket
//!   ├─ client.publish(QoS 1)   ┐
//!   └─ ticket.acknowledged()   ┘ together bounded by ack_timeout, if set
//!         ├─ Ok(pkid)          → return pkid
//!         ├─ closed            → PublishError::ConnectionClosed
//!         └─ timeout           → PublishError::AckTimeout (ticket withdrawn)
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::driver::Driver;
use crate::broker::{AckGate, BrokerClient, StatusValue, Topics};
use crate::config::MqttSettings;
use crate::error::PublishError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::state::{ConnectionState, StateCell, StateWatch};

/// Requests buffered between the client handle and the event loop.
const CLIENT_CAPACITY: usize = 16;
/// Upper bound on waiting for the driver after a disconnect request.
const DRIVER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the broker connection.
pub struct StatusPublisher {
    client: Arc<dyn BrokerClient>,
    gate: Arc<AckGate>,
    topics: Topics,
    state: Arc<StateCell>,
    bus: Bus,
    ack_timeout: Option<Duration>,
    serial: tokio::sync::Mutex<()>,
    driver: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl StatusPublisher {
    /// Opens the broker connection with the last-will armed and spawns its driver.
    ///
    /// Does not wait for the outcome; await [`StatusPublisher::state`] instead.
    pub fn connect(settings: &MqttSettings, bus: Bus) -> Self {
        let topics = Topics::new(&settings.base_topic);
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive());
        options.set_last_will(LastWill::new(
            topics.status(),
            StatusValue::Offline.as_str(),
            QoS::AtMostOnce,
            true,
        ));
        if let Some((user, pass)) = settings.credentials() {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
        let gate = Arc::new(AckGate::new());
        let state = Arc::new(StateCell::new());
        let cancel = CancellationToken::new();
        let addr = format!("{}:{}", settings.host, settings.port);

        state.set(ConnectionState::Connecting);
        bus.publish(Event::new(EventKind::BrokerConnecting).with_reason(addr.as_str()));

        let driver = Driver::new(
            addr,
            Arc::clone(&state),
            Arc::clone(&gate),
            bus.clone(),
            BackoffPolicy::default(),
            cancel.clone(),
        );
        let handle = tokio::spawn(driver.run(eventloop));

        let mut publisher = Self::from_parts(
            Arc::new(client),
            gate,
            state,
            topics,
            bus,
            settings.ack_timeout(),
        );
        publisher.cancel = cancel;
        *publisher.driver.get_mut() = Some(handle);
        publisher
    }

    /// Assembles a publisher around an existing client; no driver is spawned.
    pub fn from_parts(
        client: Arc<dyn BrokerClient>,
        gate: Arc<AckGate>,
        state: Arc<StateCell>,
        topics: Topics,
        bus: Bus,
        ack_timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            gate,
            topics,
            state,
            bus,
            ack_timeout,
            serial: tokio::sync::Mutex::new(()),
            driver: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Observes the connection state.
    pub fn state(&self) -> StateWatch {
        self.state.watch()
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Publishes at QoS 1 and returns once the broker acknowledged delivery.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<u16, PublishError> {
        let _serial = self.serial.lock().await;
        let mut ticket = self.gate.register();
        let delivery = async {
            self.client.publish(topic, payload, retain).await?;
            ticket.handed_off();
            ticket.acknowledged().await
        };

        match self.ack_timeout {
            None => delivery.await,
            Some(timeout) => tokio::time::timeout(timeout, delivery)
                .await
                .map_err(|_| PublishError::AckTimeout {
                    topic: topic.to_string(),
                    timeout,
                })?,
        }
    }

    /// Publishes the liveness value to the status topic, retained.
    pub async fn publish_status(&self, value: StatusValue) -> Result<u16, PublishError> {
        let pkid = self
            .publish(self.topics.status(), value.as_str().as_bytes().to_vec(), true)
            .await?;
        self.bus.publish(
            Event::new(EventKind::StatusPublished)
                .with_reason(value.as_str())
                .with_message_id(pkid),
        );
        Ok(pkid)
    }

    /// Publishes a payload to the event topic, not retained.
    pub async fn publish_event(&self, payload: Vec<u8>) -> Result<u16, PublishError> {
        self.publish(self.topics.event(), payload, false).await
    }

    /// Publishes `offline`, closes the connection and waits for the driver to finish.
    pub async fn disconnect(&self) {
        if self.state.get() == ConnectionState::Online {
            if let Err(e) = self.publish_status(StatusValue::Offline).await {
                tracing::warn!(error = %e, "offline status not published");
            }
        } else {
            tracing::warn!(
                state = self.state.get().as_label(),
                "broker not connected, leaving offline status to last will"
            );
        }

        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "disconnect request not queued");
        }

        let handle = self.driver.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(DRIVER_JOIN_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("broker driver did not stop in time, cancelling");
                self.cancel.cancel();
                let _ = handle.await;
            }
        }
        self.cancel.cancel();
        self.state.set(ConnectionState::Offline);
    }
}
