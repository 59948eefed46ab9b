//! # CallTranslator: one bus event per call, then rejection.
//!
//! ```text
//! CallSink queue ──► worker (arrival order)
//!                      ├─ request() ─ AlreadyTerminated ─► CallTerminated, skip
//!                      ├─ publish_event(CallEvent) ─ awaits acknowledgement
//!                      │      └─ Err ─► CallPublishFailed (call still denied)
//!                      └─ spawn ─► sleep(grace) ─► deny()
//!                                        ├─ Readable          ─► CallDenied
//!                                        └─ AlreadyTerminated ─► CallTerminated
//! ```
//!
//! Publishing is sequential so events reach the broker in arrival order. The grace
//! delay and rejection run per call so one call's delay never holds back the next
//! call's event. On shutdown the queue is drained and pending rejections are awaited.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::broker::StatusPublisher;
use crate::call::CallEvent;
use crate::events::{Bus, Event, EventKind};
use crate::signaling::{CallHandle, CallStatus, IncomingCall};

/// How a call ended from the bridge's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Rejected after the grace delay.
    Denied,
    /// The session ended before it could be read or rejected.
    Terminated,
    /// The rejection could not be sent.
    DenyFailed,
}

/// Translates call notifications into bus events.
#[derive(Clone)]
pub struct CallTranslator {
    publisher: Arc<StatusPublisher>,
    grace: Duration,
    bus: Bus,
}

impl CallTranslator {
    pub fn new(publisher: Arc<StatusPublisher>, grace: Duration, bus: Bus) -> Self {
        Self {
            publisher,
            grace,
            bus,
        }
    }

    /// Publishes the call's event and waits for its acknowledgement.
    ///
    /// Returns `false` when the call had already ended; it must then not be denied.
    pub async fn announce(&self, call: &dyn IncomingCall) -> bool {
        let request = match call.request() {
            CallStatus::Readable(request) => request,
            CallStatus::AlreadyTerminated => {
                self.bus
                    .publish(Event::new(EventKind::CallTerminated).with_call(call.id()));
                return false;
            }
        };
        self.bus.publish(
            Event::new(EventKind::CallReceived)
                .with_call(call.id())
                .with_method(request.method.as_str()),
        );

        let published = async {
            let payload = CallEvent::from_request(&request).to_json()?;
            self.publisher.publish_event(payload).await
        };
        match published.await {
            Ok(pkid) => self.bus.publish(
                Event::new(EventKind::CallPublished)
                    .with_call(call.id())
                    .with_method(request.method.as_str())
                    .with_message_id(pkid),
            ),
            Err(e) => self.bus.publish(
                Event::new(EventKind::CallPublishFailed)
                    .with_call(call.id())
                    .with_reason(e.to_string()),
            ),
        }
        true
    }

    /// Waits the grace delay, then rejects the call.
    pub async fn reject_after_grace(&self, mut call: CallHandle) -> Disposition {
        tokio::time::sleep(self.grace).await;
        match call.deny().await {
            Ok(CallStatus::Readable(())) => {
                self.bus
                    .publish(Event::new(EventKind::CallDenied).with_call(call.id()));
                Disposition::Denied
            }
            Ok(CallStatus::AlreadyTerminated) => {
                self.bus
                    .publish(Event::new(EventKind::CallTerminated).with_call(call.id()));
                Disposition::Terminated
            }
            Err(e) => {
                tracing::warn!(call_id = call.id(), error = %e, "call could not be denied");
                Disposition::DenyFailed
            }
        }
    }

    /// Handles a single call start to finish.
    pub async fn handle(&self, call: CallHandle) -> Disposition {
        if !self.announce(call.as_ref()).await {
            return Disposition::Terminated;
        }
        self.reject_after_grace(call).await
    }

    /// Spawns the worker consuming `calls` until the queue closes.
    pub fn spawn(self, calls: mpsc::Receiver<CallHandle>) -> TranslatorWorker {
        TranslatorWorker {
            handle: tokio::spawn(self.run(calls)),
        }
    }

    async fn run(self, mut calls: mpsc::Receiver<CallHandle>) {
        let mut denials = JoinSet::new();
        loop {
            tokio::select! {
                call = calls.recv() => match call {
                    Some(call) => {
                        if self.announce(call.as_ref()).await {
                            let translator = self.clone();
                            denials.spawn(async move { translator.reject_after_grace(call).await });
                        }
                    }
                    None => break,
                },
                Some(_) = denials.join_next(), if !denials.is_empty() => {}
            }
        }
        while denials.join_next().await.is_some() {}
    }
}

/// Handle to the spawned translator worker.
pub struct TranslatorWorker {
    handle: JoinHandle<()>,
}

impl TranslatorWorker {
    /// Waits until the queue is drained and every pending rejection has run.
    ///
    /// The queue closes once every [`CallSink`](crate::CallSink) clone is dropped.
    pub async fn shutdown(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "call translator worker ended abnormally");
        }
    }
}
