//! # Acknowledgement gate for QoS 1 publishes.
//!
//! A publisher registers a [`Ticket`] *before* handing the message to the client. The
//! connection driver then reports the identifier the client assigned to the outgoing
//! packet ([`AckGate::assign`]) and later its delivery acknowledgement
//! ([`AckGate::acknowledge`]), which resolves the ticket.
//!
//! ```text
//! register() ──► waiting ──assign(id)──► pending[id] ──acknowledge(id)──► ticket resolves
//!                   │                         │
//!             ticket dropped            ticket dropped → orphan (late ack is absorbed)
//!             ├─ not handed off → removed
//!             └─ handed off     → orphan (takes the late id)
//! ```
//!
//! ## Rules
//! - Waiters take identifiers in registration order.
//! - An identifier already pending is a retransmission and is not reassigned.
//! - An identifier is removed from the pending set before its ticket is resolved.
//! - A ticket whose message reached the client keeps its queue slot after being dropped,
//!   so the identifier of that message never resolves a later ticket.
//! - After [`AckGate::cancel_all`] every open and future ticket fails.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::PublishError;

struct Waiter {
    key: u64,
    tx: Option<oneshot::Sender<u16>>,
}

#[derive(Default)]
struct Inner {
    next_key: u64,
    waiting: VecDeque<Waiter>,
    pending: HashMap<u16, Waiter>,
    closed: bool,
}

/// In-flight message identifiers awaiting delivery acknowledgement.
#[derive(Default)]
pub struct AckGate {
    inner: Mutex<Inner>,
}

impl AckGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the next outgoing identifier.
    pub fn register(self: &Arc<Self>) -> Ticket {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let key = inner.next_key;
        inner.next_key = inner.next_key.wrapping_add(1);
        if !inner.closed {
            inner.waiting.push_back(Waiter { key, tx: Some(tx) });
        }
        Ticket {
            gate: Arc::clone(self),
            key,
            handed_off: false,
            rx,
        }
    }

    /// Records that the client sent a publish with `pkid`.
    ///
    /// Returns `true` when a waiter took the identifier.
    pub fn assign(&self, pkid: u16) -> bool {
        let mut inner = self.inner.lock();
        if inner.pending.contains_key(&pkid) {
            return false;
        }
        match inner.waiting.pop_front() {
            Some(waiter) => {
                inner.pending.insert(pkid, waiter);
                true
            }
            None => false,
        }
    }

    /// Resolves the ticket holding `pkid`.
    ///
    /// Returns `false` when `pkid` was not pending.
    pub fn acknowledge(&self, pkid: u16) -> bool {
        let waiter = self.inner.lock().pending.remove(&pkid);
        match waiter {
            Some(Waiter { tx: Some(tx), .. }) => {
                let _ = tx.send(pkid);
                true
            }
            Some(Waiter { tx: None, .. }) => true,
            None => false,
        }
    }

    pub fn is_pending(&self, pkid: u16) -> bool {
        self.inner.lock().pending.contains_key(&pkid)
    }

    /// Pending identifiers in ascending order.
    pub fn pending(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.inner.lock().pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Fails every open ticket and refuses new ones.
    pub fn cancel_all(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.waiting.clear();
        inner.pending.clear();
    }

    fn withdraw(&self, key: u64, handed_off: bool) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.waiting.iter().position(|w| w.key == key) {
            if handed_off {
                inner.waiting[pos].tx = None;
            } else {
                inner.waiting.remove(pos);
            }
            return;
        }
        if let Some(waiter) = inner.pending.values_mut().find(|w| w.key == key) {
            waiter.tx = None;
        }
    }
}

/// A registered publish awaiting its acknowledgement. Dropping it withdraws the waiter.
pub struct Ticket {
    gate: Arc<AckGate>,
    key: u64,
    handed_off: bool,
    rx: oneshot::Receiver<u16>,
}

impl Ticket {
    /// Marks the message as accepted by the client; an identifier will be sent for it.
    pub fn handed_off(&mut self) {
        self.handed_off = true;
    }

    /// Waits for the delivery acknowledgement and returns the acknowledged identifier.
    pub async fn acknowledged(&mut self) -> Result<u16, PublishError> {
        (&mut self.rx)
            .await
            .map_err(|_| PublishError::ConnectionClosed)
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.gate.withdraw(self.key, self.handed_off);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acknowledgement_resolves_ticket() {
        let gate = Arc::new(AckGate::new());
        let mut ticket = gate.register();
        assert!(gate.assign(7));
        assert!(gate.is_pending(7));

        assert!(gate.acknowledge(7));
        assert_eq!(ticket.acknowledged().await.unwrap(), 7);
        assert!(gate.pending().is_empty());
    }

    #[tokio::test]
    async fn ticket_stays_open_until_acknowledged() {
        let gate = Arc::new(AckGate::new());
        let mut ticket = gate.register();
        gate.assign(1);

        let wait = tokio::time::timeout(std::time::Duration::from_millis(20), ticket.acknowledged());
        assert!(wait.await.is_err());
        assert_eq!(gate.pending(), vec![1]);
    }

    #[test]
    fn retransmitted_identifier_is_not_reassigned() {
        let gate = Arc::new(AckGate::new());
        let _first = gate.register();
        assert!(gate.assign(5));
        let _second = gate.register();
        assert!(!gate.assign(5));
        assert!(gate.assign(6));
        assert_eq!(gate.pending(), vec![5, 6]);
    }

    #[test]
    fn unexpected_acknowledgement_is_reported() {
        let gate = AckGate::new();
        assert!(!gate.acknowledge(42));
    }

    #[test]
    fn dropped_ticket_withdraws_waiter() {
        let gate = Arc::new(AckGate::new());
        drop(gate.register());
        assert!(!gate.assign(3));
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn late_acknowledgement_of_dropped_ticket_is_absorbed() {
        let gate = Arc::new(AckGate::new());
        let ticket = gate.register();
        gate.assign(9);
        drop(ticket);
        assert!(gate.is_pending(9));
        assert!(gate.acknowledge(9));
        assert!(!gate.is_pending(9));
    }

    #[tokio::test]
    async fn dropped_ticket_keeps_slot_once_handed_off() {
        let gate = Arc::new(AckGate::new());
        let mut stale = gate.register();
        stale.handed_off();
        drop(stale);

        let mut next = gate.register();
        next.handed_off();
        assert!(gate.assign(1), "late id of the dropped message lands on its own slot");
        assert!(gate.acknowledge(1));

        let early = tokio::time::timeout(std::time::Duration::from_millis(20), next.acknowledged());
        assert!(early.await.is_err(), "resolved by a foreign acknowledgement");

        assert!(gate.assign(2));
        assert!(gate.acknowledge(2));
        assert_eq!(next.acknowledged().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cancel_all_fails_open_and_future_tickets() {
        let gate = Arc::new(AckGate::new());
        let mut open = gate.register();
        gate.assign(2);
        gate.cancel_all();

        assert!(matches!(open.acknowledged().await, Err(PublishError::ConnectionClosed)));
        let mut late = gate.register();
        assert!(matches!(late.acknowledged().await, Err(PublishError::ConnectionClosed)));
    }
}
