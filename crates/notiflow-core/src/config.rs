//! Notiflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NotiflowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotiflowConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_database_path() -> String { "~/.notiflow/notiflow.db".into() }

impl Default for NotiflowConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bridge: BridgeConfig::default(),
            chain: ChainConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl NotiflowConfig {
    /// Load config from the default path (~/.notiflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NotiflowError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| NotiflowError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        tracing::debug!("⚙️ Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| NotiflowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Notiflow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".notiflow")
    }

    fn validate(&self) -> Result<()> {
        if self.chain.max_depth == 0 {
            return Err(NotiflowError::Config("chain.max_depth must be at least 1".into()));
        }
        if self.bridge.timeout_secs == 0 {
            return Err(NotiflowError::Config("bridge.timeout_secs must be at least 1".into()));
        }
        if self.worker.batch_size == 0 {
            return Err(NotiflowError::Config("worker.batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Outbound bridge call configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the platform's own executor. The environment id and
    /// `/bridge` are appended per request.
    #[serde(default = "default_internal_base_url")]
    pub internal_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_internal_base_url() -> String { "http://127.0.0.1:3000/v1/environments".into() }
fn default_timeout_secs() -> u64 { 5 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 500 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            internal_base_url: default_internal_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before retry number `attempt` (0-based): base * 2^attempt.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(16));
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}

/// Job chain traversal limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Upper bound on ancestors walked for a single job. Matches the
    /// maximum number of steps a workflow may hold.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize { 20 }

impl Default for ChainConfig {
    fn default() -> Self {
        Self { max_depth: default_max_depth() }
    }
}

/// Polling worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts before a transiently failing job is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Running jobs untouched for this long are handed back to the queue.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_poll_interval_secs() -> u64 { 2 }
fn default_batch_size() -> usize { 10 }
fn default_max_attempts() -> u32 { 3 }
fn default_stale_after_secs() -> u64 { 300 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}
