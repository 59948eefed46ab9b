//! # Bridge: startup ordering, readiness gating and shutdown ordering.
//!
//! The [`Bridge`] owns the event bus and the subscriber fan-out. [`Bridge::run`] drives
//! one broker connection and one signaling backend through their lifecycle.
//!
//! ## High-level architecture
//! ```text
//! run(publisher, signaling, shutdown)
//!   ├─ await broker settled ──────────── Failed ─► BrokerUnavailable
//!   ├─ publish_status(online)            retained
//!   ├─ spawn CallTranslator ◄── CallSink queue
//!   ├─ signaling.start(sink)  ────────── Err    ─► wind down, Signaling(err)
//!   ├─ await signaling settled ───────── Failed ─► wind down, SignalingUnavailable
//!   ├─ BridgeReady
//!   ├─ await shutdown token
//!   └─ wind down:
//!        signaling.stop()         no new calls, registration withdrawn, sink dropped
//!        translator.shutdown()    queue drained, pending rejections sent
//!        drop(signaling)          transport released
//!        publisher.disconnect()   offline retained, connection closed
//! ```
//!
//! Every wait before the steady state also selects on the shutdown token; a shutdown
//! during startup winds down whatever was already started and returns `Ok(())`.
//!
//! ## Event flow
//! ```text
//! driver / signaling / translator / bridge ── publish(Event) ──► Bus
//!        └──► listener ──► SubscriberSet::emit ──► [queue N] ──► worker N ──► on_event
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::{StatusPublisher, StatusValue};
use crate::call::{CallTranslator, TranslatorWorker};
use crate::config::BridgeSettings;
use crate::error::BridgeError;
use crate::events::{Bus, Event, EventKind};
use crate::signaling::{CallSink, Signaling};
use crate::state::ConnectionState;
use crate::subscribers::SubscriberSet;

use super::builder::BridgeBuilder;

/// Coordinates the broker connection, the signaling backend and event delivery.
pub struct Bridge {
    settings: BridgeSettings,
    bus: Bus,
    listener: JoinHandle<()>,
    listener_stop: CancellationToken,
}

impl Bridge {
    /// Returns a builder for configuring subscribers.
    pub fn builder(settings: BridgeSettings) -> BridgeBuilder {
        BridgeBuilder::new(settings)
    }

    pub(crate) fn new_internal(settings: BridgeSettings, bus: Bus, subs: SubscriberSet) -> Self {
        let listener_stop = CancellationToken::new();
        let listener = Self::subscriber_listener(&bus, subs, listener_stop.clone());
        Self {
            settings,
            bus,
            listener,
            listener_stop,
        }
    }

    /// Event bus shared with the subsystems; hand it to the publisher and the backend.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runs the bridge until `shutdown` is cancelled or startup fails.
    pub async fn run<S: Signaling>(
        self,
        publisher: StatusPublisher,
        signaling: S,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError> {
        let result = self.drive(Arc::new(publisher), signaling, &shutdown).await;
        self.bus.publish(Event::new(EventKind::BridgeStopped));
        self.flush_events().await;
        result
    }

    async fn drive<S: Signaling>(
        &self,
        publisher: Arc<StatusPublisher>,
        mut signaling: S,
        shutdown: &CancellationToken,
    ) -> Result<(), BridgeError> {
        let mut broker = publisher.state();
        let state = tokio::select! {
            state = broker.settled() => state,
            _ = shutdown.cancelled() => {
                publisher.disconnect().await;
                return Ok(());
            }
        };
        if state != ConnectionState::Online {
            return Err(BridgeError::BrokerUnavailable { state });
        }

        tokio::select! {
            res = publisher.publish_status(StatusValue::Online) => {
                if let Err(e) = res {
                    publisher.disconnect().await;
                    return Err(e.into());
                }
            }
            _ = shutdown.cancelled() => {
                publisher.disconnect().await;
                return Ok(());
            }
        }

        let (sink, calls) = CallSink::new(self.settings.call_queue_capacity);
        let translator = CallTranslator::new(
            Arc::clone(&publisher),
            self.settings.call_grace(),
            self.bus.clone(),
        )
        .spawn(calls);

        if let Err(e) = signaling.start(sink).await {
            self.wind_down(signaling, translator, &publisher).await;
            return Err(e.into());
        }

        let mut registration = signaling.state();
        let state = tokio::select! {
            state = registration.settled() => state,
            _ = shutdown.cancelled() => {
                self.wind_down(signaling, translator, &publisher).await;
                return Ok(());
            }
        };
        if state != ConnectionState::Online {
            self.wind_down(signaling, translator, &publisher).await;
            return Err(BridgeError::SignalingUnavailable { state });
        }

        self.bus.publish(Event::new(EventKind::BridgeReady));
        shutdown.cancelled().await;
        self.wind_down(signaling, translator, &publisher).await;
        Ok(())
    }

    /// Stops intake, drains calls, releases signaling, then closes the broker connection.
    async fn wind_down<S: Signaling>(
        &self,
        mut signaling: S,
        translator: TranslatorWorker,
        publisher: &StatusPublisher,
    ) {
        signaling.stop().await;
        translator.shutdown().await;
        drop(signaling);
        publisher.disconnect().await;
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    fn subscriber_listener(
        bus: &Bus,
        set: SubscriberSet,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(ev),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(ev);
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }

    /// Delivers the remaining events and waits for every subscriber to process them.
    async fn flush_events(self) {
        self.listener_stop.cancel();
        if let Err(e) = self.listener.await {
            tracing::error!(error = %e, "event listener ended abnormally");
        }
    }
}
