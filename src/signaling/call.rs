//! Inbound call handle as seen by the bridge.

use async_trait::async_trait;

use crate::error::SignalingError;

/// The initiating request of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Request method, e.g. `INVITE`.
    pub method: String,
    /// Headers in message order; names may repeat.
    pub headers: Vec<(String, String)>,
}

impl CallRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Result of an operation on a call whose session may already have ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus<T> {
    Readable(T),
    /// The session ended (caller hung up, transaction gone); nothing left to do.
    AlreadyTerminated,
}

/// One inbound call attempt.
#[async_trait]
pub trait IncomingCall: Send + Sync + 'static {
    /// Stable identifier (the Call-ID for SIP).
    fn id(&self) -> &str;

    /// Returns the initiating request, unless the call has already ended.
    fn request(&self) -> CallStatus<CallRequest>;

    /// Rejects the call.
    async fn deny(&mut self) -> Result<CallStatus<()>, SignalingError>;
}

/// Owned call handed from signaling to the translator.
pub type CallHandle = Box<dyn IncomingCall>;
