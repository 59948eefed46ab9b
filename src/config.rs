//! # Bridge configuration.
//!
//! [`Config`] is read from the environment (optionally seeded from a `.env` file) and
//! may be overridden with long command-line flags. It is validated once in
//! [`Config::load`] and never modified afterwards.
//!
//! ## Sentinel values
//! - `MQTT_ACK_TIMEOUT=0` → wait for delivery acknowledgements forever
//! - `MQTT_USER=""` → connect without credentials

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use clap::{Args, Parser};

use crate::error::ConfigError;

/// Validated configuration of both subsystems and the bridge itself.
#[derive(Clone, Parser)]
#[command(name = "sip2mqtt", version, about = "Publishes inbound SIP call attempts to MQTT")]
pub struct Config {
    #[command(flatten)]
    pub mqtt: MqttSettings,
    #[command(flatten)]
    pub sip: SipSettings,
    #[command(flatten)]
    pub bridge: BridgeSettings,
}

/// Broker connection parameters.
#[derive(Clone, Args)]
pub struct MqttSettings {
    #[arg(long = "mqtt-host", env = "MQTT_HOST")]
    pub host: String,

    #[arg(long = "mqtt-port", env = "MQTT_PORT", default_value_t = 1883)]
    pub port: u16,

    /// Base topic; status goes to `<base>/status`, events to `<base>/event`.
    #[arg(long = "mqtt-basetopic", env = "MQTT_BASETOPIC")]
    pub base_topic: String,

    #[arg(id = "mqtt_user", long = "mqtt-user", env = "MQTT_USER", default_value = "")]
    pub username: String,

    #[arg(id = "mqtt_pass", long = "mqtt-pass", env = "MQTT_PASS", default_value = "", hide_env_values = true)]
    pub password: String,

    #[arg(long = "mqtt-client-id", env = "MQTT_CLIENT_ID", default_value = "sip2mqtt")]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[arg(long = "mqtt-keepalive", env = "MQTT_KEEPALIVE", default_value_t = 60)]
    pub keep_alive_secs: u64,

    /// Delivery acknowledgement timeout in seconds (`0` = none).
    #[arg(long = "mqtt-ack-timeout", env = "MQTT_ACK_TIMEOUT", default_value_t = 0)]
    pub ack_timeout_secs: u64,
}

impl MqttSettings {
    /// `(user, password)` when a user is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }

    #[inline]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Returns the acknowledgement timeout as an `Option` (`None` = wait forever).
    #[inline]
    pub fn ack_timeout(&self) -> Option<Duration> {
        match self.ack_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Registrar and local endpoint parameters.
#[derive(Clone, Args)]
pub struct SipSettings {
    #[arg(long = "sip-registrar-host", env = "SIP_REGISTRAR_HOST")]
    pub registrar_host: String,

    #[arg(long = "sip-registrar-port", env = "SIP_REGISTRAR_PORT", default_value_t = 5060)]
    pub registrar_port: u16,

    #[arg(id = "sip_user", long = "sip-user", env = "SIP_USER")]
    pub username: String,

    #[arg(id = "sip_pass", long = "sip-pass", env = "SIP_PASS", hide_env_values = true)]
    pub password: String,

    /// Address advertised in Contact/Via.
    #[arg(long = "sip-client-addr", env = "SIP_CLIENT_ADDR")]
    pub client_addr: IpAddr,

    #[arg(long = "sip-client-port", env = "SIP_CLIENT_PORT", default_value_t = 55060)]
    pub client_port: u16,

    #[arg(long = "sip-bind-addr", env = "SIP_BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_addr: IpAddr,

    /// Requested registration lifetime in seconds.
    #[arg(long = "sip-register-expires", env = "SIP_REGISTER_EXPIRES", default_value_t = 300)]
    pub register_expires: u32,
}

/// Bridge tunables.
#[derive(Clone, Args)]
pub struct BridgeSettings {
    /// Delay between an acknowledged call event and the call's rejection, in milliseconds.
    #[arg(long = "call-grace-ms", env = "CALL_GRACE_MS", default_value_t = 500)]
    pub call_grace_ms: u64,

    /// Calls waiting for the publisher before signaling intake is backpressured.
    #[arg(long = "call-queue-capacity", env = "CALL_QUEUE_CAPACITY", default_value_t = 64)]
    pub call_queue_capacity: usize,

    /// Runtime event bus ring buffer size.
    #[arg(long = "event-bus-capacity", env = "EVENT_BUS_CAPACITY", default_value_t = 1024)]
    pub bus_capacity: usize,
}

impl BridgeSettings {
    #[inline]
    pub fn call_grace(&self) -> Duration {
        Duration::from_millis(self.call_grace_ms)
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            call_grace_ms: 500,
            call_queue_capacity: 64,
            bus_capacity: 1024,
        }
    }
}

impl Config {
    /// Loads `.env` (if present), then parses and validates the environment and arguments.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::try_parse()?.validated()
    }

    /// Parses and validates an explicit argument list (environment still applies).
    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args)?.validated()
    }

    /// Rejects required settings that are present but empty.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let required = [
            ("MQTT_HOST", self.mqtt.host.as_str()),
            ("MQTT_BASETOPIC", self.mqtt.base_topic.as_str()),
            ("MQTT_CLIENT_ID", self.mqtt.client_id.as_str()),
            ("SIP_REGISTRAR_HOST", self.sip.registrar_host.as_str()),
            ("SIP_USER", self.sip.username.as_str()),
            ("SIP_PASS", self.sip.password.as_str()),
        ];
        if let Some((name, _)) = required.into_iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Empty { name });
        }
        Ok(self)
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "********" }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mqtt", &self.mqtt)
            .field("sip", &self.sip)
            .field("bridge", &self.bridge)
            .finish()
    }
}

impl fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_topic", &self.base_topic)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("client_id", &self.client_id)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("ack_timeout_secs", &self.ack_timeout_secs)
            .finish()
    }
}

impl fmt::Debug for SipSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipSettings")
            .field("registrar_host", &self.registrar_host)
            .field("registrar_port", &self.registrar_port)
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("client_addr", &self.client_addr)
            .field("client_port", &self.client_port)
            .field("bind_addr", &self.bind_addr)
            .field("register_expires", &self.register_expires)
            .finish()
    }
}

impl fmt::Debug for BridgeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeSettings")
            .field("call_grace_ms", &self.call_grace_ms)
            .field("call_queue_capacity", &self.call_queue_capacity)
            .field("bus_capacity", &self.bus_capacity)
            .finish()
    }
}
