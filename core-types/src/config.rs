// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::time::Duration;

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// File and environment backed settings. Secrets are not read here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub reset: ResetConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9095".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_daily_vote_limit")]
    pub daily_vote_limit: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            daily_vote_limit: default_daily_vote_limit(),
        }
    }
}

fn default_daily_vote_limit() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_name() -> String {
    "global-counter".to_string()
}

fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl ResetConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            self.retry_base_delay_ms,
            self.retry_max_delay_ms,
            0.2,
        )
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    25
}

fn default_retry_max_delay_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl AdminConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    60 * 60 * 24
}

/// Where counters, quotas and team bindings live. Every worker pointed at
/// the same redis instance shares one ledger; `memory` is per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl AppConfig {
    /// Reads `tally.toml` (optional) and `TALLY__SECTION__KEY` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("tally.toml").required(false))
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        if config.ledger.daily_vote_limit == 0 {
            return Err(ConfigError::Message(
                "ledger.daily_vote_limit must be at least 1".to_string(),
            ));
        }
        if config.realtime.channel_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "realtime.channel_name must not be empty".to_string(),
            ));
        }
        Ok(config)
    }
}
