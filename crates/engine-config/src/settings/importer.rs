use crate::settings::{error::SettingsError, validator::SettingsValidator};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::info;

/// How the importer schedules its channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    /// Round robin over channels; order is only preserved within a channel.
    #[default]
    Unordered,
    /// Global merge by transaction sequence number across channels.
    Ordered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckCacheSettings {
    #[serde(default = "default_ack_capacity")]
    pub capacity: u64,
    #[serde(default = "default_ack_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for AckCacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_ack_capacity(),
            ttl_secs: default_ack_ttl_secs(),
        }
    }
}

impl AckCacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub permits_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

/// Immutable configuration of one importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImporterSettings {
    /// Max records per fetch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bounded wait of a fetch, and the idle sleep of the ordered loop
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default)]
    pub ordering: OrderingMode,
    #[serde(default)]
    pub ack_cache: AckCacheSettings,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSettings>,
    /// Bounded wait of the single-channel socket importer
    #[serde(default = "default_socket_fetch_timeout_ms")]
    pub socket_fetch_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    100
}

fn default_socket_fetch_timeout_ms() -> u64 {
    3000
}

fn default_ack_capacity() -> u64 {
    10_000
}

fn default_ack_ttl_secs() -> u64 {
    300
}

fn default_burst() -> u32 {
    1
}

impl Default for ImporterSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            ordering: OrderingMode::default(),
            ack_cache: AckCacheSettings::default(),
            rate_limit: None,
            socket_fetch_timeout_ms: default_socket_fetch_timeout_ms(),
        }
    }
}

impl ImporterSettings {
    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: ImporterSettings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let settings = Self::from_json_str(&raw)?;
        info!(path = %path.display(), ordering = ?settings.ordering, "Loaded importer settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        SettingsValidator::new(self).validate()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_ordering(mut self, ordering: OrderingMode) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_rate_limit(mut self, permits_per_second: u32, burst: u32) -> Self {
        self.rate_limit = Some(RateLimitSettings {
            permits_per_second,
            burst,
        });
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn socket_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_fetch_timeout_ms)
    }

    pub fn is_ordered(&self) -> bool {
        self.ordering == OrderingMode::Ordered
    }
}
