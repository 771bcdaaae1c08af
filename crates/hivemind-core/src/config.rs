//! Hivemind configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HivemindError, Result};

/// Root configuration for the task-dispatch core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_tenant() -> String {
    "default".into()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Load config from the default path (~/.hivemind/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config");
            HivemindError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config");
            HivemindError::Config(format!("Failed to parse config: {e}"))
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| HivemindError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        tracing::info!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hivemind")
            .join("config.toml")
    }
}

/// Webhook delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Retries after the first failed attempt (total attempts = max_retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upper bound on exponential backoff delays, in seconds.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// Default HMAC signing secret. Empty means unsigned delivery
    /// unless a per-request secret is supplied.
    #[serde(default)]
    pub signing_secret: String,
}

fn default_max_retries() -> u32 {
    3
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_backoff_cap_secs() -> u64 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            signing_secret: String::new(),
        }
    }
}
