//! Retry policies for reconnecting subsystems.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized reconnects
//!
//! ## Wiring
//! ```text
//! broker::driver     ── backoff.next(failures) ──► sleep before the next poll after a drop
//! signaling::rsip    ── backoff.next(failures) ──► sleep before re-sending REGISTER
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
