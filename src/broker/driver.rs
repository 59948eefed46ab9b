//! # Broker connection driver.
//!
//! Background task that polls the [`rumqttc::EventLoop`] and turns packets and
//! connection errors into state transitions, gate updates and runtime events.
//!
//! ```text
//! loop {
//!   poll() ─┬─ ConnAck(Success)   ─► Online, BrokerConnected, reset failures
//!           ├─ Outgoing Publish   ─► gate.assign(pkid)
//!           ├─ PubAck             ─► gate.acknowledge(pkid) or AckMismatch
//!           ├─ Outgoing Disconnect ─► closing
//!           └─ Err ─┬─ closing            ─► BrokerDisconnected, stop
//!                   ├─ never online       ─► Failed, BrokerConnectFailed, stop
//!                   └─ was online         ─► Offline, BrokerDisconnected,
//!                                            sleep(backoff), Connecting, poll again
//! }
//! gate.cancel_all()
//! ```

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{ConnectReturnCode, ConnectionError, EventLoop, Outgoing, Packet};
use tokio_util::sync::CancellationToken;

use crate::broker::AckGate;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::state::{ConnectionState, StateCell};

/// Outcome of handling one connection error.
#[derive(Debug, PartialEq)]
pub(crate) enum Step {
    Stop,
    Retry(Duration),
}

pub(crate) struct Driver {
    pub(crate) addr: String,
    pub(crate) state: Arc<StateCell>,
    pub(crate) gate: Arc<AckGate>,
    pub(crate) bus: Bus,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) cancel: CancellationToken,
    online_once: bool,
    closing: bool,
    failures: u32,
}

impl Driver {
    pub(crate) fn new(
        addr: String,
        state: Arc<StateCell>,
        gate: Arc<AckGate>,
        bus: Bus,
        backoff: BackoffPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            state,
            gate,
            bus,
            backoff,
            cancel,
            online_once: false,
            closing: false,
            failures: 0,
        }
    }

    pub(crate) async fn run(mut self, mut eventloop: EventLoop) {
        loop {
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                polled = eventloop.poll() => polled,
            };
            match polled {
                Ok(event) => self.on_event(&event),
                Err(err) => match self.on_error(&err) {
                    Step::Stop => break,
                    Step::Retry(delay) => {
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        self.state.set(ConnectionState::Connecting);
                        self.bus.publish(
                            Event::new(EventKind::BrokerConnecting).with_reason(self.addr.as_str()),
                        );
                    }
                },
            }
        }
        self.gate.cancel_all();
    }

    pub(crate) fn on_event(&mut self, event: &rumqttc::Event) {
        match event {
            rumqttc::Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    self.online_once = true;
                    self.failures = 0;
                    self.state.set(ConnectionState::Online);
                    self.bus.publish(Event::new(EventKind::BrokerConnected));
                } else if !self.online_once {
                    self.state.set(ConnectionState::Failed);
                    self.bus.publish(
                        Event::new(EventKind::BrokerConnectFailed)
                            .with_reason(format!("connection refused: {:?}", ack.code)),
                    );
                }
            }
            rumqttc::Event::Incoming(Packet::PubAck(ack)) => {
                if !self.gate.acknowledge(ack.pkid) {
                    self.bus
                        .publish(Event::new(EventKind::AckMismatch).with_message_id(ack.pkid));
                }
            }
            rumqttc::Event::Outgoing(Outgoing::Publish(pkid)) if *pkid != 0 => {
                self.gate.assign(*pkid);
            }
            rumqttc::Event::Outgoing(Outgoing::Disconnect) => {
                self.closing = true;
            }
            _ => {}
        }
    }

    pub(crate) fn on_error(&mut self, err: &ConnectionError) -> Step {
        if self.closing {
            self.state.set(ConnectionState::Offline);
            self.bus.publish(Event::new(EventKind::BrokerDisconnected));
            return Step::Stop;
        }
        if !self.online_once || self.state.get() == ConnectionState::Failed {
            self.state.set(ConnectionState::Failed);
            self.bus
                .publish(Event::new(EventKind::BrokerConnectFailed).with_reason(err.to_string()));
            return Step::Stop;
        }
        if self.state.set(ConnectionState::Offline) != ConnectionState::Offline {
            self.bus
                .publish(Event::new(EventKind::BrokerDisconnected).with_reason(err.to_string()));
        }
        let delay = self.backoff.next(self.failures);
        self.failures = self.failures.saturating_add(1);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnecting to mqtt broker");
        Step::Retry(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::JitterPolicy;
    use rumqttc::{ConnAck, PubAck};

    fn driver() -> (Driver, tokio::sync::broadcast::Receiver<Event>) {
        let bus = Bus::new(32);
        let rx = bus.subscribe();
        let backoff = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        let d = Driver::new(
            "broker:1883".into(),
            Arc::new(StateCell::new()),
            Arc::new(AckGate::new()),
            bus,
            backoff,
            CancellationToken::new(),
        );
        (d, rx)
    }

    fn connack() -> rumqttc::Event {
        rumqttc::Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)))
    }

    fn io_error() -> ConnectionError {
        ConnectionError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
    }

    #[test]
    fn connack_brings_connection_online() {
        let (mut d, mut rx) = driver();
        d.on_event(&connack());
        assert_eq!(d.state.get(), ConnectionState::Online);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::BrokerConnected);
    }

    #[test]
    fn error_before_first_connack_is_fatal() {
        let (mut d, mut rx) = driver();
        assert_eq!(d.on_error(&io_error()), Step::Stop);
        assert_eq!(d.state.get(), ConnectionState::Failed);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::BrokerConnectFailed);
    }

    #[test]
    fn error_after_connack_schedules_reconnect() {
        let (mut d, mut rx) = driver();
        d.on_event(&connack());
        let _ = rx.try_recv();

        assert_eq!(d.on_error(&io_error()), Step::Retry(Duration::from_millis(100)));
        assert_eq!(d.state.get(), ConnectionState::Offline);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::BrokerDisconnected);

        assert_eq!(d.on_error(&io_error()), Step::Retry(Duration::from_millis(200)));
        assert!(rx.try_recv().is_err(), "already offline, no second disconnect event");
    }

    #[test]
    fn error_after_disconnect_request_stops_cleanly() {
        let (mut d, mut rx) = driver();
        d.on_event(&connack());
        d.on_event(&rumqttc::Event::Outgoing(Outgoing::Disconnect));
        let _ = rx.try_recv();

        assert_eq!(d.on_error(&io_error()), Step::Stop);
        assert_eq!(d.state.get(), ConnectionState::Offline);
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::BrokerDisconnected);
        assert!(ev.reason.is_none());
    }

    #[tokio::test]
    async fn outgoing_id_and_puback_resolve_ticket() {
        let (mut d, mut rx) = driver();
        let mut ticket = d.gate.register();
        d.on_event(&rumqttc::Event::Outgoing(Outgoing::Publish(4)));
        assert!(d.gate.is_pending(4));

        d.on_event(&rumqttc::Event::Incoming(Packet::PubAck(PubAck::new(4))));
        assert_eq!(ticket.acknowledged().await.unwrap(), 4);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn puback_for_unknown_id_is_a_mismatch() {
        let (mut d, mut rx) = driver();
        d.on_event(&rumqttc::Event::Incoming(Packet::PubAck(PubAck::new(11))));
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::AckMismatch);
        assert_eq!(ev.message_id, Some(11));
    }
}
