//! # Signaling side of the bridge.
//!
//! The bridge core only knows the traits in this module:
//! - [`Signaling`]: start with a [`CallSink`], expose a [`StateWatch`], stop.
//! - [`IncomingCall`]: read the initiating request, deny the call.
//!
//! [`RsipSignaling`] implements both on top of `rsipstack` (UDP, digest registration).
//!
//! ```text
//! registrar ◄── REGISTER ── RsipSignaling ── INVITE ──► CallSink ──► CallTranslator
//!                                 ▲                                       │
//!                                 └──────────── 486 Busy Here ◄── deny() ─┘
//! ```

mod call;
mod sink;
mod sip;

use async_trait::async_trait;

use crate::error::SignalingError;
use crate::state::StateWatch;

pub use call::{CallHandle, CallRequest, CallStatus, IncomingCall};
pub use sink::CallSink;
pub use sip::RsipSignaling;

/// A signaling backend delivering inbound calls.
#[async_trait]
pub trait Signaling: Send + 'static {
    /// Opens the transport and starts registration; calls are delivered to `sink`.
    ///
    /// The registration outcome is reported through [`Signaling::state`].
    async fn start(&mut self, sink: CallSink) -> Result<(), SignalingError>;

    /// Observes the registration state.
    fn state(&self) -> StateWatch;

    /// Stops accepting calls, withdraws the registration and releases the sink.
    async fn stop(&mut self);
}
