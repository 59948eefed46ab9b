//! # Backoff policy for reconnect and re-registration attempts.
//!
//! The delay for consecutive failure `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`, then jittered. The base is derived from the failure count alone, so jitter
//! never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use sip2mqtt::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(30),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(3), Duration::from_secs(8));
//! assert_eq!(backoff.next(10), Duration::from_secs(30));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied to every computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `factor = 2.0`, `max = 30s`, `jitter = Equal`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay after `failures` consecutive failures (0-indexed).
    pub fn next(&self, failures: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failures.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_secs: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_secs(max_secs),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn exponential_growth_without_jitter() {
        let p = policy(100, 30, 2.0);
        assert_eq!(p.next(0), Duration::from_millis(100));
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(4), Duration::from_millis(1600));
    }

    #[test]
    fn first_exceeding_max_is_clamped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(10),
            ..policy(0, 5, 2.0)
        };
        assert_eq!(p.next(0), Duration::from_secs(5));
    }

    #[test]
    fn overflow_clamps_to_max() {
        assert_eq!(policy(100, 10, 2.0).next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn default_policy_stays_within_bounds() {
        let p = BackoffPolicy::default();
        for failures in 0..20 {
            let d = p.next(failures);
            assert!(d <= Duration::from_secs(30), "failures {failures}: {d:?}");
        }
        assert!(p.next(0) >= Duration::from_millis(500));
    }
}
