//! # sip2mqtt
//!
//! **sip2mqtt** watches a SIP account for inbound call attempts and republishes each one
//! as a JSON event on an MQTT broker, alongside a retained liveness status. It never
//! answers: every observed call is rejected after a short grace delay.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   registrar / callers                                   MQTT broker
//!          │ INVITE, CANCEL                                    ▲
//!          ▼                                                   │ <base>/status (retained)
//! ┌──────────────────┐   CallSink    ┌────────────────┐        │ <base>/event
//! │  RsipSignaling   │ ────────────► │ CallTranslator │ ──► StatusPublisher ──► AckGate
//! │ (impl Signaling) │ ◄──── deny ── │  (one queue)   │        ▲
//! └────────┬─────────┘               └────────────────┘        │ driver: ConnAck, PubAck
//!          │ StateWatch                                        │ StateWatch
//!          ▼                                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Bridge (lifecycle orchestrator)                                  │
//! │  - startup: broker online → status online → signaling registered  │
//! │  - shutdown: stop signaling → drain calls → offline → disconnect  │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                     Bus (broadcast runtime events)
//!                                   ▼
//!                     SubscriberSet ──► LogWriter, custom subscribers
//! ```
//!
//! ### Publish discipline
//! Each publish is QoS 1 and suspends its caller until the broker acknowledged that
//! message identifier. Publishes are serialized, so a broker that stops acknowledging
//! stalls the translator, the call queue fills up, and signaling intake waits.
//! `MQTT_ACK_TIMEOUT` bounds the wait ([`PublishError::AckTimeout`]).
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                        |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------|
//! | **Orchestration** | Startup/shutdown ordering with readiness gating.              | [`Bridge`], [`BridgeBuilder`]             |
//! | **Broker**        | Last-will, retained status, acknowledgement-gated publishes.  | [`StatusPublisher`], [`AckGate`]          |
//! | **Calls**         | Call event payload and the publish-then-reject translator.    | [`CallTranslator`], [`CallEvent`]         |
//! | **Signaling**     | Backend seam and the `rsipstack` implementation.              | [`Signaling`], [`IncomingCall`], [`RsipSignaling`] |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, alerts).          | [`Subscribe`], [`LogWriter`]              |
//! | **Policies**      | Reconnect and re-registration backoff.                        | [`BackoffPolicy`], [`JitterPolicy`]       |
//! | **Configuration** | Environment / `.env` / flags, validated once.                 | [`Config`]                                |
//! | **Errors**        | Typed errors with stable labels.                              | [`BridgeError`], [`PublishError`]         |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use sip2mqtt::{Bridge, Config, LogWriter, RsipSignaling, StatusPublisher, Subscribe};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::load()?;
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let bridge = Bridge::builder(cfg.bridge.clone()).with_subscribers(subs).build();
//!
//!     let token = CancellationToken::new();
//!     sip2mqtt::shutdown::spawn_listener(token.clone(), bridge.bus().clone());
//!
//!     let publisher = StatusPublisher::connect(&cfg.mqtt, bridge.bus().clone());
//!     let signaling = RsipSignaling::new(cfg.sip.clone(), bridge.bus().clone());
//!     bridge.run(publisher, signaling, token).await?;
//!     Ok(())
//! }
//! ```

mod broker;
mod call;
mod config;
mod core;
mod error;
mod events;
mod policies;
mod signaling;
mod state;
mod subscribers;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use broker::{AckGate, BrokerClient, StatusPublisher, StatusValue, Ticket, Topics};
pub use call::{CallEvent, CallTranslator, Disposition, TranslatorWorker};
pub use config::{BridgeSettings, Config, MqttSettings, SipSettings};
pub use core::{Bridge, BridgeBuilder, shutdown};
pub use error::{BridgeError, ConfigError, PublishError, SignalingError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use signaling::{
    CallHandle, CallRequest, CallSink, CallStatus, IncomingCall, RsipSignaling, Signaling,
};
pub use state::{ConnectionState, StateCell, StateWatch};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
