use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Guards against a stalled upstream connection holding resources forever.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_endpoint() -> String {
    "https://api.gpt-oss.com/chatkit".to_string()
}

fn default_read_timeout_secs() -> u64 {
    300
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from an explicit path, or fall back to defaults when no file is
    /// given. The gateway is expected to run configuration-free.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match explicit_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading config");
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply the `PORT` environment variable. An unset or unparsable value
    /// leaves the current port untouched.
    pub fn apply_port_env(&mut self) {
        self.apply_port_value(std::env::var("PORT").ok().as_deref());
    }

    fn apply_port_value(&mut self, raw: Option<&str>) {
        if let Some(port) = raw.and_then(|p| p.parse().ok()) {
            self.port = port;
        }
    }
}
