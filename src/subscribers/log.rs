//! # LogWriter: renders runtime events as `tracing` records.
//!
//! ## Example output
//! ```text
//! INFO sip2mqtt: mqtt broker connection established
//! INFO sip2mqtt: sip request received call_id="a84b4c76e66710" method="INVITE"
//! INFO sip2mqtt: call denied call_id="a84b4c76e66710"
//! ERROR sip2mqtt: delivery acknowledgement for a message id not pending message_id=12
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "sip2mqtt";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        let call = e.call_id.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::BrokerConnecting => {
                tracing::info!(target: TARGET, broker = reason, "trying to connect to mqtt broker");
            }
            EventKind::BrokerConnected => {
                tracing::info!(target: TARGET, "mqtt broker connection established");
            }
            EventKind::BrokerConnectFailed => {
                tracing::error!(target: TARGET, error = reason, "connection to mqtt broker failed");
            }
            EventKind::BrokerDisconnected => {
                tracing::info!(target: TARGET, error = reason, "disconnected from mqtt broker");
            }
            EventKind::StatusPublished => {
                tracing::info!(target: TARGET, status = reason, message_id = e.message_id, "status published");
            }
            EventKind::AckMismatch => {
                tracing::error!(
                    target: TARGET,
                    message_id = e.message_id,
                    "delivery acknowledgement for a message id not pending"
                );
            }
            EventKind::SignalingStarting => {
                tracing::info!(target: TARGET, registrar = reason, "registering with sip registrar");
            }
            EventKind::SignalingRegistered => {
                tracing::info!(target: TARGET, "sip client started");
            }
            EventKind::SignalingFailed => {
                tracing::error!(target: TARGET, error = reason, "sip registration failed");
            }
            EventKind::SignalingStopped => {
                tracing::info!(target: TARGET, "sip client stopped");
            }
            EventKind::CallReceived => {
                tracing::info!(
                    target: TARGET,
                    call_id = call,
                    method = e.method.as_deref().unwrap_or("-"),
                    "sip request received"
                );
            }
            EventKind::CallPublished => {
                tracing::debug!(target: TARGET, call_id = call, message_id = e.message_id, "call event published");
            }
            EventKind::CallPublishFailed => {
                tracing::error!(target: TARGET, call_id = call, error = reason, "call event not published");
            }
            EventKind::CallDenied => {
                tracing::info!(target: TARGET, call_id = call, "call denied");
            }
            EventKind::CallTerminated => {
                tracing::debug!(target: TARGET, call_id = call, "call ended before it could be handled");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: TARGET, "received termination event");
            }
            EventKind::BridgeReady => {
                tracing::info!(target: TARGET, "listening...");
            }
            EventKind::BridgeStopped => {
                tracing::info!(target: TARGET, "exiting");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!(target: TARGET, detail = reason, kind = ?e.kind, "event subscriber degraded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
