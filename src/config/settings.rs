use std::time::Duration;

use serde::Deserialize;

use crate::packet::MAX_LEN;
use crate::retry::Backoff;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub client: ClientSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Client-facing listener and per-connection timing.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Ping interval for accepted connections; 0 disables keepalive.
    pub keepalive_ms: u64,
    pub ping_timeout_ms: u64,
    /// How long a socket may stay open without a successful CONNECT.
    pub auth_timeout_ms: u64,
    /// Inbound frames with a larger body are refused with `MessageTooBig`.
    pub max_packet_size: usize,
}

impl ServerSettings {
    /// `host:port` for the client listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Deadline for the first CONNECT.
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            keepalive_ms: 60_000,
            ping_timeout_ms: 5_000,
            auth_timeout_ms: 10_000,
            max_packet_size: MAX_LEN,
        }
    }
}

/// Outbound session settings, used by the CLI client and broker peer links.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    pub addr: String,
    /// Ping interval once opened; 0 disables keepalive.
    pub keepalive_ms: u64,
    pub ping_timeout_ms: u64,
    pub retry_limit: u32,
    pub backoff: BackoffSettings,
}

impl ClientSettings {
    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            keepalive_ms: 60_000,
            ping_timeout_ms: 5_000,
            retry_limit: 100,
            backoff: BackoffSettings::default(),
        }
    }
}

/// Reconnect delay strategy, tagged by `strategy`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum BackoffSettings {
    Constant { delay_ms: u64 },
    Linear { base_ms: u64, step_ms: u64 },
    Exponential { base_ms: u64, exponent: f64 },
    Random { min_ms: u64, max_ms: u64 },
}

impl Default for BackoffSettings {
    fn default() -> Self {
        BackoffSettings::Constant { delay_ms: 2_000 }
    }
}

impl From<&BackoffSettings> for Backoff {
    fn from(s: &BackoffSettings) -> Self {
        let ms = Duration::from_millis;
        match *s {
            BackoffSettings::Constant { delay_ms } => Backoff::Constant(ms(delay_ms)),
            BackoffSettings::Linear { base_ms, step_ms } => Backoff::Linear {
                base: ms(base_ms),
                step: ms(step_ms),
            },
            BackoffSettings::Exponential { base_ms, exponent } => Backoff::Exponential {
                base: ms(base_ms),
                exponent,
            },
            BackoffSettings::Random { min_ms, max_ms } => Backoff::Random {
                min: ms(min_ms),
                max: ms(max_ms),
            },
        }
    }
}

/// Broker node identity and its peer mesh.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerSettings {
    pub node_id: String,
    pub peer_host: String,
    pub peer_port: u16,
    /// `host:port` of sibling brokers' peer listeners.
    pub peers: Vec<String>,
    /// Shared secret presented by peer links. Empty accepts any peer.
    pub peer_token: String,
}

impl BrokerSettings {
    /// `peer_host:peer_port` for the peer listener.
    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.peer_host, self.peer_port)
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            peer_host: "127.0.0.1".to_string(),
            peer_port: 8081,
            peers: Vec::new(),
            peer_token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// A section that is present is deserialised with per-field defaults; an
/// absent section falls back to its `Default`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<ServerSettings>,
    pub client: Option<ClientSettings>,
    pub broker: Option<BrokerSettings>,
    pub log: Option<LogSettings>,
}

impl PartialSettings {
    /// Fills absent sections with their defaults.
    pub fn merge(self) -> Settings {
        Settings {
            server: self.server.unwrap_or_default(),
            client: self.client.unwrap_or_default(),
            broker: self.broker.unwrap_or_default(),
            log: self.log.unwrap_or_default(),
        }
    }
}
