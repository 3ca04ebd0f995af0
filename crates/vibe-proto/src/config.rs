use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Where the pipeline server lives.  Read once at startup; the base URL is
/// never reassigned while the process runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for request/response calls.  Progress streams are not bound by it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StreamConfig {
    /// End a progress stream with an idle-timeout error when no bytes arrive
    /// for this many seconds.  Unset disables the check: the server only
    /// emits on change and a single download can take minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_n_results")]
    pub n_results: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_results: default_n_results(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_n_results() -> u32 {
    20
}

impl ApiConfig {
    /// 0 means no per-request timeout.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
