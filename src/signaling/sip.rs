//! # RsipSignaling: SIP user agent on `rsipstack`.
//!
//! ```text
//! start(sink)
//!   ├─ UDP transport  bind SIP_BIND_ADDR:SIP_CLIENT_PORT, advertise SIP_CLIENT_ADDR
//!   ├─ endpoint.serve()                         (transport task)
//!   ├─ registration loop                        REGISTER, refresh at expires/2
//!   │     first failure  ─► Failed, stop
//!   │     later failure  ─► Offline, retry with backoff
//!   └─ intake loop
//!         INVITE  ─► 100 Trying, deliver to sink
//!         CANCEL  ─► 200 OK, 487 on the INVITE, call becomes AlreadyTerminated
//!         OPTIONS ─► 200 OK
//!         ACK     ─► ignored
//!         other   ─► 405 Method Not Allowed
//!
//! stop()  ─► end intake (drops sink), un-REGISTER (expires 0)
//! drop    ─► transport cancelled
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rsipstack::EndpointBuilder;
use rsipstack::dialog::authenticate::Credential;
use rsipstack::dialog::registration::Registration;
use rsipstack::transaction::endpoint::EndpointInner;
use rsipstack::transaction::transaction::Transaction;
use rsipstack::transaction::Endpoint;
use rsipstack::transport::TransportLayer;
use rsipstack::transport::udp::UdpConnection;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::SipSettings;
use crate::error::SignalingError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::signaling::{CallRequest, CallSink, CallStatus, IncomingCall, Signaling};
use crate::state::{ConnectionState, StateCell, StateWatch};

const USER_AGENT: &str = concat!("sip2mqtt/", env!("CARGO_PKG_VERSION"));
/// A rejected INVITE is kept alive this long to absorb the caller's ACK.
const ACK_WAIT: Duration = Duration::from_secs(32);
const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// SIP backend registering with a registrar and rejecting every inbound call.
pub struct RsipSignaling {
    settings: SipSettings,
    bus: Bus,
    state: Arc<StateCell>,
    backoff: BackoffPolicy,
    transport: CancellationToken,
    stopping: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    _endpoint: Option<Endpoint>,
    _release: DropGuard,
}

impl RsipSignaling {
    pub fn new(settings: SipSettings, bus: Bus) -> Self {
        let transport = CancellationToken::new();
        Self {
            settings,
            bus,
            state: Arc::new(StateCell::new()),
            backoff: BackoffPolicy::default(),
            stopping: transport.child_token(),
            _release: transport.clone().drop_guard(),
            transport,
            workers: Vec::new(),
            _endpoint: None,
        }
    }

    fn fail(&self, err: SignalingError) -> SignalingError {
        self.state.set(ConnectionState::Failed);
        self.bus
            .publish(Event::new(EventKind::SignalingFailed).with_reason(err.to_string()));
        err
    }

    async fn open(&self) -> Result<Endpoint, SignalingError> {
        let bind = SocketAddr::new(self.settings.bind_addr, self.settings.client_port);
        let external = SocketAddr::new(self.settings.client_addr, self.settings.client_port);

        let transport_layer = TransportLayer::new(self.transport.child_token());
        let udp =
            UdpConnection::create_connection(bind, Some(external), Some(self.transport.child_token()))
                .await
                .map_err(|e| SignalingError::Transport(format!("bind {bind}: {e}")))?;
        transport_layer.add_transport(udp.into());

        Ok(EndpointBuilder::new()
            .with_cancel_token(self.transport.child_token())
            .with_transport_layer(transport_layer)
            .with_user_agent(USER_AGENT)
            .build())
    }
}

#[async_trait]
impl Signaling for RsipSignaling {
    async fn start(&mut self, sink: CallSink) -> Result<(), SignalingError> {
        let registrar =
            registrar_uri(&self.settings.registrar_host, self.settings.registrar_port)
                .map_err(|e| self.fail(e))?;
        self.state.set(ConnectionState::Connecting);
        self.bus.publish(
            Event::new(EventKind::SignalingStarting).with_reason(registrar.to_string()),
        );

        let endpoint = self.open().await.map_err(|e| self.fail(e))?;
        let incoming = endpoint
            .incoming_transactions()
            .map_err(|e| self.fail(SignalingError::Transport(e.to_string())))?;

        let inner = endpoint.inner.clone();
        let serve = Arc::clone(&inner);
        let (state, bus, stopping) = (Arc::clone(&self.state), self.bus.clone(), self.stopping.clone());
        tokio::spawn(async move {
            let res = serve.serve().await.map_err(|e| e.to_string());
            transport_ended(res, &state, &bus, &stopping);
        });

        let intake = Intake {
            sink,
            calls: Arc::new(CallRegistry::default()),
            stopping: self.stopping.clone(),
        };
        self.workers.push(tokio::spawn(intake.run(incoming)));

        let registrar = Registrar {
            endpoint: inner,
            credential: Credential {
                username: self.settings.username.clone(),
                password: self.settings.password.clone(),
                realm: None,
            },
            uri: registrar,
            expires: self.settings.register_expires,
            state: Arc::clone(&self.state),
            bus: self.bus.clone(),
            backoff: self.backoff,
            stopping: self.stopping.clone(),
        };
        self.workers.push(tokio::spawn(registrar.run()));
        self._endpoint = Some(endpoint);
        Ok(())
    }

    fn state(&self) -> StateWatch {
        self.state.watch()
    }

    async fn stop(&mut self) {
        self.stopping.cancel();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        self.state.set(ConnectionState::Offline);
        self.bus.publish(Event::new(EventKind::SignalingStopped));
    }
}

fn registrar_uri(host: &str, port: u16) -> Result<rsip::Uri, SignalingError> {
    let raw = format!("sip:{host}:{port}");
    rsip::Uri::try_from(raw.as_str())
        .map_err(|e| SignalingError::InvalidAddress(format!("{raw}: {e}")))
}

/// Keeps the registration alive and withdraws it on stop.
struct Registrar {
    endpoint: Arc<EndpointInner>,
    credential: Credential,
    uri: rsip::Uri,
    expires: u32,
    state: Arc<StateCell>,
    bus: Bus,
    backoff: BackoffPolicy,
    stopping: CancellationToken,
}

impl Registrar {
    async fn run(self) {
        let mut registration =
            Registration::new(Arc::clone(&self.endpoint), Some(self.credential.clone()));
        let mut registered = false;
        let mut failures = 0u32;

        loop {
            let outcome = tokio::select! {
                _ = self.stopping.cancelled() => break,
                outcome = registration.register(self.uri.clone(), Some(self.expires)) => outcome,
            };
            let wait = match outcome {
                Ok(resp) if resp.status_code.kind() == rsip::StatusCodeKind::Successful => {
                    failures = 0;
                    registered = true;
                    if self.state.set(ConnectionState::Online) != ConnectionState::Online {
                        self.bus.publish(Event::new(EventKind::SignalingRegistered));
                    }
                    refresh_interval(self.expires)
                }
                other => {
                    let reason = match other {
                        Ok(resp) => format!("registrar answered {}", resp.status_code),
                        Err(e) => e.to_string(),
                    };
                    if !registered {
                        self.state.set(ConnectionState::Failed);
                        self.bus
                            .publish(Event::new(EventKind::SignalingFailed).with_reason(reason));
                        return;
                    }
                    self.state.set(ConnectionState::Offline);
                    self.bus
                        .publish(Event::new(EventKind::SignalingFailed).with_reason(reason));
                    let delay = self.backoff.next(failures);
                    failures = failures.saturating_add(1);
                    delay
                }
            };
            tokio::select! {
                _ = self.stopping.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if registered {
            let unregister = registration.register(self.uri.clone(), Some(0));
            match tokio::time::timeout(UNREGISTER_TIMEOUT, unregister).await {
                Ok(Ok(_)) => tracing::debug!("registration withdrawn"),
                Ok(Err(e)) => tracing::warn!(error = %e, "un-register failed"),
                Err(_) => tracing::warn!("un-register timed out"),
            }
        }
    }
}

fn refresh_interval(expires: u32) -> Duration {
    Duration::from_secs(u64::from(expires.max(2) / 2))
}

/// Dispatches inbound transactions by method.
struct Intake {
    sink: CallSink,
    calls: Arc<CallRegistry>,
    stopping: CancellationToken,
}

impl Intake {
    async fn run(self, mut incoming: UnboundedReceiver<Transaction>) {
        loop {
            let tx = tokio::select! {
                _ = self.stopping.cancelled() => break,
                tx = incoming.recv() => match tx {
                    Some(tx) => tx,
                    None => break,
                },
            };
            let keep_going = match tx.original.method {
                rsip::Method::Invite => self.on_invite(tx).await,
                rsip::Method::Cancel => {
                    self.on_cancel(tx).await;
                    true
                }
                rsip::Method::Options => {
                    reply(tx, rsip::StatusCode::OK).await;
                    true
                }
                rsip::Method::Ack => true,
                _ => {
                    reply(tx, rsip::StatusCode::MethodNotAllowed).await;
                    true
                }
            };
            if !keep_going {
                break;
            }
        }
    }

    async fn on_invite(&self, mut tx: Transaction) -> bool {
        let request = call_request(&tx.original);
        let Some(id) = call_id(&request) else {
            tracing::warn!("INVITE without Call-ID rejected");
            reply(tx, rsip::StatusCode::BadRequest).await;
            return true;
        };
        if let Err(e) = tx.reply(rsip::StatusCode::Trying).await {
            tracing::debug!(call_id = %id, error = %e, "provisional reply not sent");
            return true;
        }

        let slot = Arc::new(CallSlot::new(Some(tx)));
        self.calls.insert(id.clone(), Arc::clone(&slot));
        let call = RsipCall {
            id,
            request,
            slot,
            calls: Arc::clone(&self.calls),
        };
        tokio::select! {
            _ = self.stopping.cancelled() => false,
            delivered = self.sink.deliver(Box::new(call)) => delivered,
        }
    }

    async fn on_cancel(&self, tx: Transaction) {
        let request = call_request(&tx.original);
        let slot = call_id(&request).and_then(|id| self.calls.take(&id));
        let Some(slot) = slot else {
            reply(tx, rsip::StatusCode::CallTransactionDoesNotExist).await;
            return;
        };

        slot.cancel();
        reply(tx, rsip::StatusCode::OK).await;
        let invite = slot.tx.lock().await.take();
        if let Some(invite) = invite {
            reply(invite, rsip::StatusCode::RequestTerminated).await;
        }
        tracing::debug!(call_id = ?call_id(&request), "call cancelled by caller");
    }
}

async fn reply(mut tx: Transaction, status: rsip::StatusCode) {
    if let Err(e) = tx.reply(status.clone()).await {
        tracing::debug!(status = %status, error = %e, "reply not sent");
    }
}

/// Builds the header list from the wire form of each header.
fn call_request(req: &rsip::Request) -> CallRequest {
    let headers = req
        .headers
        .iter()
        .filter_map(|h| split_header_line(&h.to_string()))
        .collect();
    CallRequest {
        method: req.method.to_string(),
        headers,
    }
}

fn split_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Call-ID value, accepting the compact form `i`.
fn call_id(request: &CallRequest) -> Option<String> {
    request
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("call-id") || name.eq_ignore_ascii_case("i"))
        .map(|(_, value)| value.clone())
}

/// INVITE server transaction of one call.
struct CallSlot {
    tx: tokio::sync::Mutex<Option<Transaction>>,
    cancelled: AtomicBool,
}

impl CallSlot {
    fn new(tx: Option<Transaction>) -> Self {
        Self {
            tx: tokio::sync::Mutex::new(tx),
            cancelled: AtomicBool::new(false),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Calls that can still be cancelled, keyed by Call-ID.
#[derive(Default)]
struct CallRegistry {
    calls: Mutex<HashMap<String, Arc<CallSlot>>>,
}

impl CallRegistry {
    fn insert(&self, id: String, slot: Arc<CallSlot>) {
        self.calls.lock().insert(id, slot);
    }

    fn take(&self, id: &str) -> Option<Arc<CallSlot>> {
        self.calls.lock().remove(id)
    }

    /// Removes `id` only while it still maps to `slot`.
    fn release(&self, id: &str, slot: &Arc<CallSlot>) {
        let mut calls = self.calls.lock();
        if calls.get(id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            calls.remove(id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.calls.lock().len()
    }
}

struct RsipCall {
    id: String,
    request: CallRequest,
    slot: Arc<CallSlot>,
    calls: Arc<CallRegistry>,
}

#[async_trait]
impl IncomingCall for RsipCall {
    fn id(&self) -> &str {
        &self.id
    }

    fn request(&self) -> CallStatus<CallRequest> {
        if self.slot.is_cancelled() {
            CallStatus::AlreadyTerminated
        } else {
            CallStatus::Readable(self.request.clone())
        }
    }

    async fn deny(&mut self) -> Result<CallStatus<()>, SignalingError> {
        self.calls.release(&self.id, &self.slot);
        if self.slot.is_cancelled() {
            return Ok(CallStatus::AlreadyTerminated);
        }
        let Some(mut tx) = self.slot.tx.lock().await.take() else {
            return Ok(CallStatus::AlreadyTerminated);
        };
        match tx.reply(rsip::StatusCode::BusyHere).await {
            Ok(()) => {
                tokio::spawn(absorb_ack(tx));
                Ok(CallStatus::Readable(()))
            }
            Err(rsipstack::Error::TransactionError(..)) => Ok(CallStatus::AlreadyTerminated),
            Err(e) => Err(SignalingError::Transport(e.to_string())),
        }
    }
}

async fn absorb_ack(mut tx: Transaction) {
    let wait = async {
        while let Some(msg) = tx.receive().await {
            if let rsip::SipMessage::Request(req) = msg {
                if req.method == rsip::Method::Ack {
                    break;
                }
            }
        }
    };
    let _ = tokio::time::timeout(ACK_WAIT, wait).await;
}

/// Reports an endpoint that stopped serving outside of [`Signaling::stop`].
fn transport_ended(
    res: Result<(), String>,
    state: &StateCell,
    bus: &Bus,
    stopping: &CancellationToken,
) {
    let Err(e) = res else { return };
    if stopping.is_cancelled() {
        tracing::debug!(error = %e, "sip endpoint ended during stop");
        return;
    }
    tracing::error!(error = %e, "sip endpoint stopped serving");
    state.set(ConnectionState::Failed);
    bus.publish(Event::new(EventKind::SignalingFailed).with_reason(format!("transport: {e}")));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> CallRequest {
        CallRequest::new("INVITE")
            .with_header("From", "<sip:0301234@fritz.box>;tag=1")
            .with_header("Call-ID", "a84b4c76e66710")
    }

    #[test]
    fn header_line_is_split_at_first_colon() {
        assert_eq!(
            split_header_line("From: <sip:0301234@fritz.box>;tag=1"),
            Some(("From".into(), "<sip:0301234@fritz.box>;tag=1".into()))
        );
        assert_eq!(split_header_line("garbage"), None);
        assert_eq!(split_header_line(": value"), None);
    }

    #[test]
    fn call_id_accepts_compact_form() {
        assert_eq!(call_id(&invite()).as_deref(), Some("a84b4c76e66710"));
        let compact = CallRequest::new("CANCEL").with_header("i", "xyz");
        assert_eq!(call_id(&compact).as_deref(), Some("xyz"));
        assert_eq!(call_id(&CallRequest::new("INVITE")), None);
    }

    #[test]
    fn registrar_uri_is_built_from_host_and_port() {
        assert!(registrar_uri("fritz.box", 5060).is_ok());
    }

    #[test]
    fn refresh_happens_at_half_the_expiry() {
        assert_eq!(refresh_interval(300), Duration::from_secs(150));
        assert_eq!(refresh_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn release_keeps_a_newer_slot_for_the_same_id() {
        let registry = CallRegistry::default();
        let old = Arc::new(CallSlot::new(None));
        let new = Arc::new(CallSlot::new(None));
        registry.insert("a".into(), Arc::clone(&old));
        registry.insert("a".into(), Arc::clone(&new));

        registry.release("a", &old);
        assert_eq!(registry.len(), 1);
        registry.release("a", &new);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_call_is_already_terminated() {
        let calls = Arc::new(CallRegistry::default());
        let slot = Arc::new(CallSlot::new(None));
        calls.insert("a84b4c76e66710".into(), Arc::clone(&slot));
        let mut call = RsipCall {
            id: "a84b4c76e66710".into(),
            request: invite(),
            slot: Arc::clone(&slot),
            calls: Arc::clone(&calls),
        };
        assert_eq!(call.request(), CallStatus::Readable(invite()));

        slot.cancel();
        assert_eq!(call.request(), CallStatus::AlreadyTerminated);
        assert_eq!(call.deny().await.unwrap(), CallStatus::AlreadyTerminated);
        assert_eq!(calls.len(), 0);
    }

    #[test]
    fn dead_transport_fails_registration_state() {
        let state = StateCell::new();
        state.set(ConnectionState::Online);
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        transport_ended(Err("socket closed".into()), &state, &bus, &CancellationToken::new());

        assert_eq!(state.get(), ConnectionState::Failed);
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::SignalingFailed);
    }

    #[test]
    fn transport_end_during_stop_is_quiet() {
        let state = StateCell::new();
        state.set(ConnectionState::Online);
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let stopping = CancellationToken::new();
        stopping.cancel();

        transport_ended(Err("socket closed".into()), &state, &bus, &stopping);
        transport_ended(Ok(()), &state, &bus, &CancellationToken::new());

        assert_eq!(state.get(), ConnectionState::Online);
        assert!(rx.try_recv().is_err());
    }
}
