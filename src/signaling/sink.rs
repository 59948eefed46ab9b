use tokio::sync::mpsc;

use crate::signaling::CallHandle;

/// Bounded queue from signaling intake to the call translator.
///
/// Delivery waits while the queue is full, so a stalled publisher backpressures intake.
#[derive(Clone, Debug)]
pub struct CallSink {
    tx: mpsc::Sender<CallHandle>,
}

impl CallSink {
    /// Creates a sink of the given capacity (clamped to at least 1) and its receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CallHandle>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues a call; `false` once the translator has gone away.
    pub async fn deliver(&self, call: CallHandle) -> bool {
        self.tx.send(call).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
