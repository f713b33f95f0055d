//! Runtime configuration for the sync pipeline.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "dispatcher": { "poll_interval_ms": 10000, "batch_size": 50, "max_retries": 5, "publish_timeout_ms": 30000 },
//!   "transport": { "kind": "http", "endpoint": "http://temperature:8080/api/sync" }
//! }
//! ```
//!
//! `SyncConfig::from_env` reads the same settings from `HOUSE_SYNC_*` variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "HOUSE_SYNC_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub publish_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            batch_size: 50,
            max_retries: 5,
            publish_timeout_ms: 30_000,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Copy with every zero setting raised to 1.
    pub fn clamped(&self) -> Self {
        Self {
            poll_interval_ms: self.poll_interval_ms.max(1),
            batch_size: self.batch_size.max(1),
            max_retries: self.max_retries.max(1),
            publish_timeout_ms: self.publish_timeout_ms.max(1),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be positive".into()));
        }
        if self.publish_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "publish_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Which publisher a deployment uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Publish onto per-entity topics of a message bus.
    #[default]
    Topic,
    /// POST envelopes directly to the replica's sync endpoint.
    Http { endpoint: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    pub dispatcher: DispatcherConfig,
    pub transport: TransportConfig,
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            serde_json::from_str(json).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `HOUSE_SYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading from an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = SyncConfig::default();
        let d = &mut config.dispatcher;

        if let Some(v) = get("POLL_INTERVAL_MS") {
            d.poll_interval_ms = parse("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("BATCH_SIZE") {
            d.batch_size = parse("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            d.max_retries = parse("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("PUBLISH_TIMEOUT_MS") {
            d.publish_timeout_ms = parse("PUBLISH_TIMEOUT_MS", &v)?;
        }

        config.transport = match get("TRANSPORT").as_deref() {
            None | Some("topic") => TransportConfig::Topic,
            Some("http") => TransportConfig::Http {
                endpoint: get("SYNC_ENDPOINT").unwrap_or_default(),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}TRANSPORT"),
                    value: other.to_string(),
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatcher.validate()?;
        if let TransportConfig::Http { endpoint } = &self.transport {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "http transport requires an endpoint".into(),
                ));
            }
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}
