//! Test doubles for the broker client, the signaling backend and inbound calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::broker::{AckGate, BrokerClient, StatusPublisher, Topics};
use crate::error::{PublishError, SignalingError};
use crate::events::{Bus, Event, EventKind};
use crate::signaling::{CallHandle, CallRequest, CallSink, CallStatus, IncomingCall, Signaling};
use crate::state::{ConnectionState, StateCell, StateWatch};
use crate::subscribers::Subscribe;

/// Subscriber keeping every event it sees.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

/// Ordered log of side effects shared between fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub at: Instant,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AckMode {
    Auto,
    Manual,
    Reject,
    /// Accepts publishes but never reports an identifier, like a driver in backoff.
    Unassigned,
    /// Never returns from `publish`, like a full request channel.
    Stall,
}

/// Broker client recording publishes and driving the gate like the connection driver.
pub struct FakeBroker {
    gate: Arc<AckGate>,
    mode: AckMode,
    next_pkid: AtomicU16,
    unacked: Mutex<VecDeque<u16>>,
    published: Mutex<Vec<Published>>,
    disconnected: AtomicBool,
    journal: Journal,
}

impl FakeBroker {
    fn with_mode(mode: AckMode, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(AckGate::new()),
            mode,
            next_pkid: AtomicU16::new(1),
            unacked: Mutex::new(VecDeque::new()),
            published: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
            journal,
        })
    }

    /// Acknowledges every publish immediately.
    pub fn auto_ack() -> Arc<Self> {
        Self::with_mode(AckMode::Auto, Journal::default())
    }

    pub fn auto_ack_in(journal: &Journal) -> Arc<Self> {
        Self::with_mode(AckMode::Auto, journal.clone())
    }

    /// Never acknowledges on its own; see [`FakeBroker::ack_next`].
    pub fn manual() -> Arc<Self> {
        Self::with_mode(AckMode::Manual, Journal::default())
    }

    pub fn unassigned() -> Arc<Self> {
        Self::with_mode(AckMode::Unassigned, Journal::default())
    }

    pub fn stalled() -> Arc<Self> {
        Self::with_mode(AckMode::Stall, Journal::default())
    }

    /// Refuses every publish.
    pub fn rejecting() -> Arc<Self> {
        Self::with_mode(AckMode::Reject, Journal::default())
    }

    pub fn gate(&self) -> Arc<AckGate> {
        Arc::clone(&self.gate)
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    pub fn published_at(&self, index: usize) -> Instant {
        self.published.lock()[index].at
    }

    /// Acknowledges the oldest unacknowledged publish.
    pub fn ack_next(&self) -> Option<u16> {
        let pkid = self.unacked.lock().pop_front()?;
        self.gate.acknowledge(pkid);
        Some(pkid)
    }

    pub fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Publisher around this client with the given connection state.
    pub fn publisher(
        self: &Arc<Self>,
        state: Arc<StateCell>,
        bus: Bus,
        ack_timeout: Option<Duration>,
    ) -> StatusPublisher {
        StatusPublisher::from_parts(
            Arc::clone(self) as Arc<dyn BrokerClient>,
            self.gate(),
            state,
            Topics::new("home/sip/"),
            bus,
            ack_timeout,
        )
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), PublishError> {
        match self.mode {
            AckMode::Reject => return Err(PublishError::Client("rejected by fake broker".into())),
            AckMode::Stall => std::future::pending::<()>().await,
            _ => {}
        }
        self.journal.record(format!(
            "publish {topic} {}",
            String::from_utf8_lossy(&payload)
        ));
        self.published.lock().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
            at: Instant::now(),
        });

        if self.mode == AckMode::Unassigned {
            return Ok(());
        }
        let pkid = self.next_pkid.fetch_add(1, Ordering::SeqCst);
        self.gate.assign(pkid);
        match self.mode {
            AckMode::Auto => {
                self.gate.acknowledge(pkid);
            }
            _ => self.unacked.lock().push_back(pkid),
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        self.journal.record("broker disconnect");
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Online publisher on `home/sip/` with its own bus.
pub fn publisher_for(broker: &Arc<FakeBroker>, ack_timeout: Option<Duration>) -> StatusPublisher {
    let state = Arc::new(StateCell::new());
    state.set(ConnectionState::Online);
    broker.publisher(state, Bus::new(64), ack_timeout)
}

/// Observations of one [`FakeCall`].
#[derive(Default)]
pub struct CallProbe {
    denied_at: Mutex<Option<Instant>>,
    attempted: AtomicBool,
}

impl CallProbe {
    pub fn denied_at(&self) -> Option<Instant> {
        *self.denied_at.lock()
    }

    pub fn deny_attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }
}

/// Scripted inbound call.
pub struct FakeCall {
    id: String,
    request: CallStatus<CallRequest>,
    deny: CallStatus<()>,
    probe: Arc<CallProbe>,
    journal: Journal,
}

impl FakeCall {
    fn scripted(
        id: &str,
        request: CallStatus<CallRequest>,
        deny: CallStatus<()>,
        journal: Journal,
    ) -> (CallHandle, Arc<CallProbe>) {
        let probe = Arc::new(CallProbe::default());
        let call = FakeCall {
            id: id.to_string(),
            request,
            deny,
            probe: Arc::clone(&probe),
            journal,
        };
        (Box::new(call), probe)
    }

    /// An INVITE carrying its id as Call-ID.
    pub fn invite(id: &str) -> (CallHandle, Arc<CallProbe>) {
        Self::invite_in(id, &Journal::default())
    }

    pub fn invite_in(id: &str, journal: &Journal) -> (CallHandle, Arc<CallProbe>) {
        let request = CallRequest::new("INVITE").with_header("Call-ID", id);
        Self::with_request(id, request, journal)
    }

    pub fn with_request(
        id: &str,
        request: CallRequest,
        journal: &Journal,
    ) -> (CallHandle, Arc<CallProbe>) {
        Self::scripted(
            id,
            CallStatus::Readable(request),
            CallStatus::Readable(()),
            journal.clone(),
        )
    }

    /// Ended before the bridge could read it.
    pub fn terminated(id: &str) -> (CallHandle, Arc<CallProbe>) {
        Self::scripted(
            id,
            CallStatus::AlreadyTerminated,
            CallStatus::AlreadyTerminated,
            Journal::default(),
        )
    }

    /// Readable, but the caller hangs up before the rejection.
    pub fn hangs_up_before_deny(id: &str) -> (CallHandle, Arc<CallProbe>) {
        let request = CallRequest::new("INVITE").with_header("Call-ID", id);
        Self::scripted(
            id,
            CallStatus::Readable(request),
            CallStatus::AlreadyTerminated,
            Journal::default(),
        )
    }
}

#[async_trait]
impl IncomingCall for FakeCall {
    fn id(&self) -> &str {
        &self.id
    }

    fn request(&self) -> CallStatus<CallRequest> {
        self.request.clone()
    }

    async fn deny(&mut self) -> Result<CallStatus<()>, SignalingError> {
        self.probe.attempted.store(true, Ordering::SeqCst);
        if self.deny == CallStatus::Readable(()) {
            *self.probe.denied_at.lock() = Some(Instant::now());
            self.journal.record(format!("deny {}", self.id));
        }
        Ok(self.deny.clone())
    }
}

/// Test-side controls of a [`FakeSignaling`].
#[derive(Clone)]
pub struct SignalingHandle {
    sink: Arc<Mutex<Option<CallSink>>>,
    started: Arc<Notify>,
}

impl SignalingHandle {
    /// Waits until the bridge started the backend.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    /// Delivers a call; `false` when the backend is not (or no longer) running.
    pub async fn deliver(&self, call: CallHandle) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => sink.deliver(call).await,
            None => false,
        }
    }
}

/// Signaling backend settling in a scripted state.
pub struct FakeSignaling {
    state: Arc<StateCell>,
    outcome: ConnectionState,
    start_error: bool,
    sink: Arc<Mutex<Option<CallSink>>>,
    started: Arc<Notify>,
    journal: Journal,
}

impl FakeSignaling {
    fn scripted(
        outcome: ConnectionState,
        start_error: bool,
        journal: &Journal,
    ) -> (Self, SignalingHandle) {
        let sink = Arc::new(Mutex::new(None));
        let started = Arc::new(Notify::new());
        let fake = Self {
            state: Arc::new(StateCell::new()),
            outcome,
            start_error,
            sink: Arc::clone(&sink),
            started: Arc::clone(&started),
            journal: journal.clone(),
        };
        (fake, SignalingHandle { sink, started })
    }

    /// Registration succeeds.
    pub fn registering(journal: &Journal) -> (Self, SignalingHandle) {
        Self::scripted(ConnectionState::Online, false, journal)
    }

    /// Registrar rejects the registration.
    pub fn rejected(journal: &Journal) -> (Self, SignalingHandle) {
        Self::scripted(ConnectionState::Failed, false, journal)
    }

    /// Transport cannot be opened.
    pub fn unbindable(journal: &Journal) -> (Self, SignalingHandle) {
        Self::scripted(ConnectionState::Failed, true, journal)
    }
}

#[async_trait]
impl Signaling for FakeSignaling {
    async fn start(&mut self, sink: CallSink) -> Result<(), SignalingError> {
        self.journal.record("signaling start");
        if self.start_error {
            self.state.set(ConnectionState::Failed);
            return Err(SignalingError::Transport("address in use".into()));
        }
        *self.sink.lock() = Some(sink);
        self.state.set(ConnectionState::Connecting);
        self.state.set(self.outcome);
        self.started.notify_one();
        Ok(())
    }

    fn state(&self) -> StateWatch {
        self.state.watch()
    }

    async fn stop(&mut self) {
        self.journal.record("signaling stop");
        self.sink.lock().take();
        self.state.set(ConnectionState::Offline);
    }
}
