//! # Broker side of the bridge.
//!
//! - [`StatusPublisher`] owns the MQTT connection: last-will, retained liveness status,
//!   acknowledgement-gated publishes and the clean disconnect.
//! - [`AckGate`] tracks the in-flight message identifier of the current publish.
//! - [`BrokerClient`] is the seam over the outgoing half of the client library.
//! - [`Topics`] resolves `<base>/status` and `<base>/event`.

mod client;
mod driver;
mod gate;
mod publisher;
mod topics;

pub use client::BrokerClient;
pub use gate::{AckGate, Ticket};
pub use publisher::StatusPublisher;
pub use topics::{StatusValue, Topics};
