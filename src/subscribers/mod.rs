//! # Event subscribers for the bridge runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in [`LogWriter`] for runtime events broadcast through the [`Bus`](crate::Bus).
//!
//! ## Architecture
//! ```text
//!   broker / signaling / translator ── publish(Event) ──► Bus
//!                                                          │
//!                                          Bridge::subscriber_listener()
//!                                                          │
//!                                                   SubscriberSet::emit
//!                                              ┌───────────┼───────────┐
//!                                              ▼           ▼           ▼
//!                                          LogWriter    Metrics     Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use sip2mqtt::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct MissedCalls;
//!
//! #[async_trait]
//! impl Subscribe for MissedCalls {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::CallPublishFailed {
//!             // raise an alert
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "missed-calls"
//!     }
//! }
//! ```

mod log;
mod subscriber;
mod subscriber_set;

pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
