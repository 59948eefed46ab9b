//! # Runtime events emitted by the bridge and its subsystems.
//!
//! The [`EventKind`] enum classifies events across four groups:
//! - **Broker events**: connection lifecycle, status publishes, acknowledgement mismatches
//! - **Signaling events**: registration lifecycle
//! - **Call events**: per-call progress through the translator
//! - **Bridge events**: readiness, shutdown, subscriber health
//!
//! The [`Event`] struct carries optional metadata (reason, method, message id, call id).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use sip2mqtt::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CallPublished)
//!     .with_call("a84b4c76e66710")
//!     .with_method("INVITE")
//!     .with_message_id(7);
//!
//! assert_eq!(ev.kind, EventKind::CallPublished);
//! assert_eq!(ev.method.as_deref(), Some("INVITE"));
//! assert_eq!(ev.message_id, Some(7));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Broker ===
    /// Connection to the broker is being opened.
    ///
    /// Sets:
    /// - `reason`: `host:port`
    BrokerConnecting,

    /// Broker accepted the connection.
    BrokerConnected,

    /// Broker connection attempt was rejected or could not be made.
    ///
    /// Sets:
    /// - `reason`: error message
    BrokerConnectFailed,

    /// Connection to the broker was lost or closed.
    ///
    /// Sets:
    /// - `reason`: error message (unclean drop only)
    BrokerDisconnected,

    /// A status value was published and acknowledged.
    ///
    /// Sets:
    /// - `reason`: the status value
    /// - `message_id`: acknowledged identifier
    StatusPublished,

    /// A delivery acknowledgement arrived for an identifier that was not pending.
    ///
    /// Sets:
    /// - `message_id`: the unexpected identifier
    AckMismatch,

    // === Signaling ===
    /// Signaling backend is binding and registering.
    ///
    /// Sets:
    /// - `reason`: registrar address
    SignalingStarting,

    /// Registrar accepted the registration.
    SignalingRegistered,

    /// Registration was rejected or the transport could not be opened.
    ///
    /// Sets:
    /// - `reason`: error message
    SignalingFailed,

    /// Signaling stopped accepting calls.
    SignalingStopped,

    // === Calls ===
    /// A call notification was taken from the queue.
    ///
    /// Sets:
    /// - `call_id`, `method`
    CallReceived,

    /// The call's event was published and acknowledged.
    ///
    /// Sets:
    /// - `call_id`, `method`, `message_id`
    CallPublished,

    /// The call's event could not be published.
    ///
    /// Sets:
    /// - `call_id`, `reason`
    CallPublishFailed,

    /// The call was rejected.
    ///
    /// Sets:
    /// - `call_id`
    CallDenied,

    /// The call's session ended before it could be read or rejected.
    ///
    /// Sets:
    /// - `call_id`
    CallTerminated,

    // === Bridge ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// Both subsystems are online; the bridge is listening.
    BridgeReady,

    /// Shutdown sequence finished.
    BridgeStopped,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name> info=<panic>`
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name> reason=<full|closed>`
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Human-readable reason (errors, addresses, status values).
    pub reason: Option<Arc<str>>,
    /// Signaling method of the call, if applicable.
    pub method: Option<Arc<str>>,
    /// Broker message identifier, if applicable.
    pub message_id: Option<u16>,
    /// Call identifier, if applicable.
    pub call_id: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            reason: None,
            method: None,
            message_id: None,
            call_id: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a signaling method.
    #[inline]
    pub fn with_method(mut self, method: impl Into<Arc<str>>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Attaches a broker message identifier.
    #[inline]
    pub fn with_message_id(mut self, id: u16) -> Self {
        self.message_id = Some(id);
        self
    }

    /// Attaches a call identifier.
    #[inline]
    pub fn with_call(mut self, call_id: impl Into<Arc<str>>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}
