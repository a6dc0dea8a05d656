use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::SessionError;

pub const DEFAULT_ENDPOINT: &str = "wss://echo.websocket.org";

/// Session configuration. The endpoint is the only required input; the rest
/// tunes timers and deadlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub endpoint: String,
    #[serde(alias = "enablePeriodicPing")]
    pub enable_periodic_ping: bool,
    #[serde(alias = "pingIntervalMs")]
    pub ping_interval_ms: u64,
    #[serde(alias = "pingTimeoutMs")]
    pub ping_timeout_ms: u64,
    #[serde(alias = "connectTimeoutMs")]
    pub connect_timeout_ms: u64,
    #[serde(alias = "closeTimeoutMs")]
    pub close_timeout_ms: u64,
    /// Deadline for a single text or ping write.
    #[serde(alias = "writeTimeoutMs")]
    pub write_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            enable_periodic_ping: false,
            ping_interval_ms: 30_000,
            ping_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            close_timeout_ms: 5_000,
            write_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `SOCKLINK_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    /// Unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("SOCKLINK_ENDPOINT") {
            if !v.trim().is_empty() {
                config.endpoint = v.trim().to_owned();
            }
        }
        if let Some(v) = lookup("SOCKLINK_PERIODIC_PING") {
            config.enable_periodic_ping = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(v) = lookup("SOCKLINK_PING_INTERVAL_MS") {
            config.ping_interval_ms = v.trim().parse().unwrap_or(config.ping_interval_ms);
        }
        if let Some(v) = lookup("SOCKLINK_PING_TIMEOUT_MS") {
            config.ping_timeout_ms = v.trim().parse().unwrap_or(config.ping_timeout_ms);
        }
        if let Some(v) = lookup("SOCKLINK_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = v.trim().parse().unwrap_or(config.connect_timeout_ms);
        }
        if let Some(v) = lookup("SOCKLINK_CLOSE_TIMEOUT_MS") {
            config.close_timeout_ms = v.trim().parse().unwrap_or(config.close_timeout_ms);
        }
        if let Some(v) = lookup("SOCKLINK_WRITE_TIMEOUT_MS") {
            config.write_timeout_ms = v.trim().parse().unwrap_or(config.write_timeout_ms);
        }

        config
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            SessionError::ConfigurationInvalid {
                reason: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |reason: String| Err(SessionError::ConfigurationInvalid { reason });

        let scheme_ok = ["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| self.endpoint.starts_with(scheme));
        if !scheme_ok {
            return invalid(format!(
                "endpoint '{}' must start with ws://, wss://, http:// or https://",
                self.endpoint
            ));
        }
        for (name, value) in [
            ("ping_interval_ms", self.ping_interval_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("close_timeout_ms", self.close_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if value == 0 {
                return invalid(format!("{} must be greater than zero", name));
            }
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
