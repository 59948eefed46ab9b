//! # Per-subsystem connection state.
//!
//! Each subsystem (broker, signaling) owns one [`StateCell`] and is its only writer.
//! The orchestrator holds a [`StateWatch`] and awaits transitions instead of polling.
//!
//! ## Transitions
//! ```text
//! Offline ──► Connecting ──► Online ──► Offline   (clean or unclean disconnect)
//!                  │
//!                  └──────► Failed               (connection attempt rejected)
//! ```

use std::fmt;

use tokio::sync::watch;

/// Connection lifecycle state of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    Connecting,
    Online,
    /// Connection attempt rejected; startup must not proceed.
    Failed,
}

impl ConnectionState {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionState::Offline => "offline",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Online => "online",
            ConnectionState::Failed => "failed",
        }
    }

    /// `true` once a connection attempt has an outcome (`Online` or `Failed`).
    pub fn is_settled(&self) -> bool {
        matches!(self, ConnectionState::Online | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Writer side of a subsystem's connection state.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    /// Creates a cell in [`ConnectionState::Offline`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Offline);
        Self { tx }
    }

    /// Stores `next` and returns the previous state.
    pub fn set(&self, next: ConnectionState) -> ConnectionState {
        self.tx.send_replace(next)
    }

    /// Current state.
    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Creates a reader observing this cell.
    pub fn watch(&self) -> StateWatch {
        StateWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of a subsystem's connection state.
#[derive(Debug, Clone)]
pub struct StateWatch {
    rx: watch::Receiver<ConnectionState>,
}

impl StateWatch {
    /// Current state.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    /// Waits until the state is `Online` or `Failed` and returns it.
    ///
    /// If the writer is dropped first, the last observed state is returned.
    pub async fn settled(&mut self) -> ConnectionState {
        let settled = self.rx.wait_for(ConnectionState::is_settled).await.map(|s| *s);
        settled.unwrap_or_else(|_| *self.rx.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous_state() {
        let cell = StateCell::new();
        assert_eq!(cell.set(ConnectionState::Connecting), ConnectionState::Offline);
        assert_eq!(cell.set(ConnectionState::Online), ConnectionState::Connecting);
        assert_eq!(cell.get(), ConnectionState::Online);
    }

    #[tokio::test]
    async fn settled_waits_for_outcome() {
        let cell = StateCell::new();
        let mut watch = cell.watch();
        cell.set(ConnectionState::Connecting);

        let waiter = tokio::spawn(async move { watch.settled().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        cell.set(ConnectionState::Failed);
        assert_eq!(waiter.await.unwrap(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn settled_returns_last_state_when_writer_dropped() {
        let cell = StateCell::new();
        let mut watch = cell.watch();
        cell.set(ConnectionState::Connecting);
        drop(cell);
        assert_eq!(watch.settled().await, ConnectionState::Connecting);
    }
}
