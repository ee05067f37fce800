//! Gateway configuration with validation.
//!
//! The file is JSON. Field names match the configuration files already
//! deployed alongside the gateway, hence the PascalCase keys.

use crate::domain::routing::{Destination, RoutingTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that replaces `RabbitPassword` when set.
pub const RABBIT_PASSWORD_ENV: &str = "GATEWAY_RABBIT_PASSWORD";

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GatewayConfig {
    /// HTTP listen address, e.g. `":8080"` or `"127.0.0.1:8080"`
    #[serde(rename = "HTTP")]
    pub http: String,
    /// Directory of `.priv` decryption keys, named by fingerprint
    pub sources_keys_path: PathBuf,
    /// Directory of `.pub` ticket verification keys, named by signer id
    pub ticket_keys_path: PathBuf,
    /// Prefix applied to every task's URIs before dispatch
    #[serde(rename = "SampleStorageURI")]
    pub sample_storage_uri: String,
    /// Organization -> allowed task names (`*` allows all)
    pub allowed_tasks: HashMap<String, Vec<String>>,
    /// Broker `host:port[/vhost]`
    #[serde(rename = "RabbitURI")]
    pub rabbit_uri: String,
    /// Broker user
    pub rabbit_user: String,
    /// Broker password
    pub rabbit_password: String,
    /// Destination for analyses without an override
    pub rabbit_default: Destination,
    /// Per-analysis override destinations
    pub rabbit: HashMap<String, Destination>,
    /// Reconnect policy after a failed publish
    pub reconnect: ReconnectConfig,
    /// Broker deadlines
    pub timeouts: TimeoutConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: ":8080".to_string(),
            sources_keys_path: PathBuf::from("keys/sources"),
            ticket_keys_path: PathBuf::from("keys/tickets"),
            sample_storage_uri: String::new(),
            allowed_tasks: HashMap::new(),
            rabbit_uri: "localhost:5672/".to_string(),
            rabbit_user: "guest".to_string(),
            rabbit_password: "guest".to_string(),
            rabbit_default: Destination::new("totem_input", "totem", "work.static.totem"),
            rabbit: HashMap::new(),
            reconnect: ReconnectConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Read, parse and validate a configuration file, then apply environment
    /// overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(password) = lookup(RABBIT_PASSWORD_ENV) {
            self.rabbit_password = password;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http_addr()?;

        if self.rabbit_uri.trim().is_empty() {
            return Err(ConfigError::Invalid("RabbitURI cannot be empty".into()));
        }

        if self.sources_keys_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "SourcesKeysPath cannot be empty".into(),
            ));
        }
        if self.ticket_keys_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("TicketKeysPath cannot be empty".into()));
        }

        validate_destination("RabbitDefault", &self.rabbit_default)?;
        for (task, destination) in &self.rabbit {
            validate_destination(&format!("Rabbit.{task}"), destination)?;
        }

        for (org, tasks) in &self.allowed_tasks {
            if tasks.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "AllowedTasks.{org} cannot be empty"
                )));
            }
        }

        if self.reconnect.attempts == 0 {
            return Err(ConfigError::Invalid(
                "Reconnect.Attempts cannot be 0".into(),
            ));
        }

        if self.timeouts.connect.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect timeout cannot be 0".into(),
            ));
        }
        if self.timeouts.publish.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "publish timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address. A bare `":port"` binds all interfaces.
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.http.trim();
        if let Some(port) = raw.strip_prefix(':') {
            let port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidAddress(raw.to_string()))?;
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
        }
        raw.parse()
            .map_err(|_| ConfigError::InvalidAddress(raw.to_string()))
    }

    /// AMQP connection URI including credentials.
    pub fn broker_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}",
            self.rabbit_user, self.rabbit_password, self.rabbit_uri
        )
    }

    /// Routing table built from `RabbitDefault` and `Rabbit`.
    pub fn routing_table(&self) -> RoutingTable {
        RoutingTable::new(self.rabbit_default.clone(), self.rabbit.clone())
    }
}

fn validate_destination(name: &str, destination: &Destination) -> Result<(), ConfigError> {
    if destination.exchange.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{name}.Exchange cannot be empty")));
    }
    if destination.queue.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{name}.Queue cannot be empty")));
    }
    Ok(())
}

/// Reconnect policy applied after a failed publish
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReconnectConfig {
    /// Dial attempts before giving up (default: 3)
    pub attempts: u32,
    /// Pause between dial attempts (default: 3s)
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// Deadlines for blocking broker operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimeoutConfig {
    /// Dial + channel setup + declarations
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    /// A single publish including its broker confirmation
    #[serde(with = "humantime_serde")]
    pub publish: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            publish: Duration::from_secs(10),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read configuration: {0}")]
    Io(String),
    /// File is not valid configuration JSON
    #[error("cannot parse configuration: {0}")]
    Parse(String),
    /// Listen address does not parse
    #[error("invalid listen address: {0}")]
    InvalidAddress(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Plain number = seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
