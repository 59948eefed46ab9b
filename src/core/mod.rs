//! Runtime core: orchestration and lifecycle.
//!
//! The public API from this module is [`Bridge`] (with its [`BridgeBuilder`]) and the
//! termination signal helpers in [`shutdown`].
//!
//! Internal modules:
//! - [`bridge`]: startup ordering, readiness gating, shutdown ordering, event fan-out;
//! - [`builder`]: assembles the bus and subscribers;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod bridge;
mod builder;
pub mod shutdown;

pub use bridge::Bridge;
pub use builder::BridgeBuilder;
