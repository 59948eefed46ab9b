//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `broker::driver`, `StatusPublisher`, `signaling::rsip`,
//!   `CallTranslator`, `Bridge`, `SubscriberSet` workers (overflow/panic).
//! - **Consumer**: `Bridge::subscriber_listener()` (fans out to `SubscriberSet`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
