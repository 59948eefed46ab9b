//! Error types used by the bridge and its subsystems.
//!
//! This module defines four error enums:
//!
//! - [`ConfigError`]: the configuration is incomplete or malformed (fatal, pre-start).
//! - [`PublishError`]: a broker publish did not complete with a delivery acknowledgement.
//! - [`SignalingError`]: the signaling backend failed to bind, register or reply.
//! - [`BridgeError`]: failures that abort the orchestrator itself.
//!
//! Every type provides `as_label` (stable snake_case label for logs).

use std::time::Duration;
use thiserror::Error;

use crate::state::ConnectionState;

/// # Errors produced while loading the configuration.
///
/// Any of these terminates the process with exit code 1 before a subsystem is touched.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Command line / environment parsing failed (includes missing required settings).
    #[error(transparent)]
    Cli(#[from] clap::Error),

    /// A required setting is present but empty.
    #[error("{name} must not be empty")]
    Empty {
        /// Environment variable name.
        name: &'static str,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Cli(_) => "config_invalid",
            ConfigError::Empty { .. } => "config_empty",
        }
    }

    /// Whether this "error" is a help/version request that should exit successfully.
    pub fn is_informational(&self) -> bool {
        matches!(self, ConfigError::Cli(e) if !e.use_stderr())
    }
}

/// # Errors produced by an acknowledgement-gated publish.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PublishError {
    /// The broker client refused to queue the publish.
    #[error("broker client rejected publish: {0}")]
    Client(String),

    /// The connection driver went away before the acknowledgement arrived.
    #[error("connection closed before delivery was acknowledged")]
    ConnectionClosed,

    /// No acknowledgement arrived within the configured limit.
    #[error("no delivery acknowledgement on {topic} within {timeout:?}")]
    AckTimeout {
        /// Topic of the stalled publish.
        topic: String,
        /// The configured acknowledgement timeout.
        timeout: Duration,
    },

    /// The event could not be serialized.
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use sip2mqtt::PublishError;
    ///
    /// assert_eq!(PublishError::ConnectionClosed.as_label(), "publish_connection_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::Client(_) => "publish_client",
            PublishError::ConnectionClosed => "publish_connection_closed",
            PublishError::AckTimeout { .. } => "publish_ack_timeout",
            PublishError::Encode(_) => "publish_encode",
        }
    }
}

/// # Errors produced by the signaling backend.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SignalingError {
    /// Socket or transaction layer failure.
    #[error("signaling transport error: {0}")]
    Transport(String),

    /// The registrar rejected or never answered the REGISTER.
    #[error("registration failed: {0}")]
    Registration(String),

    /// A configured address could not be turned into a SIP URI or socket address.
    #[error("invalid signaling address: {0}")]
    InvalidAddress(String),
}

impl SignalingError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SignalingError::Transport(_) => "signaling_transport",
            SignalingError::Registration(_) => "signaling_registration",
            SignalingError::InvalidAddress(_) => "signaling_invalid_address",
        }
    }
}

/// # Errors that abort the bridge.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The broker connection never came online.
    #[error("mqtt broker unavailable (state: {state})")]
    BrokerUnavailable {
        /// State the broker connection settled in.
        state: ConnectionState,
    },

    /// The signaling registration never came online.
    #[error("sip registration unavailable (state: {state})")]
    SignalingUnavailable {
        /// State the signaling subsystem settled in.
        state: ConnectionState,
    },

    /// The signaling backend could not be started.
    #[error(transparent)]
    Signaling(#[from] SignalingError),

    /// The initial status publish failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl BridgeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use sip2mqtt::{BridgeError, ConnectionState};
    ///
    /// let err = BridgeError::BrokerUnavailable { state: ConnectionState::Failed };
    /// assert_eq!(err.as_label(), "bridge_broker_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BridgeError::BrokerUnavailable { .. } => "bridge_broker_unavailable",
            BridgeError::SignalingUnavailable { .. } => "bridge_signaling_unavailable",
            BridgeError::Signaling(e) => e.as_label(),
            BridgeError::Publish(e) => e.as_label(),
        }
    }
}
