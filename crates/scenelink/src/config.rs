//! Client Configuration
//!
//! Layered configuration: built-in defaults, then `scenelink.toml`, then
//! `SCENELINK_*` environment variables (`__` separates sections, e.g.
//! `SCENELINK_SERVER__PORT=9000`). CLI flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::transport::{Backoff, ReconnectPolicy};

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "scenelink.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SCENELINK_";

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] figment::Error),
}

/// Complete client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub assets: AssetConfig,
}

/// Scene authority endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Use `wss://` instead of `ws://`
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2345,
            path: "/".to_string(),
            secure: false,
        }
    }
}

impl ServerConfig {
    /// WebSocket URL of the scene authority.
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }
}

/// Reconnect strategy name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Fixed,
    Exponential,
}

/// Reconnect settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub strategy: Strategy,
    pub base_delay_ms: u64,
    /// Upper bound for exponential backoff
    pub max_delay_ms: u64,
    pub factor: f64,
    pub jitter: bool,
    /// 0 retries forever
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Fixed,
            base_delay_ms: 3000,
            max_delay_ms: 60_000,
            factor: 2.0,
            jitter: false,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Build the runtime policy from these settings.
    pub fn policy(&self) -> ReconnectPolicy {
        let backoff = match self.strategy {
            Strategy::Fixed => Backoff::Fixed,
            Strategy::Exponential => Backoff::Exponential {
                factor: self.factor,
                max_delay: Duration::from_millis(self.max_delay_ms),
            },
        };

        ReconnectPolicy {
            backoff,
            base_delay: Duration::from_millis(self.base_delay_ms),
            jitter: self.jitter,
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
        }
    }
}

/// Asset storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Base URL that asset names are resolved against
    pub remote_storage: String,
    /// Extension every requested asset is rewritten to
    pub forced_type: String,
    /// Pause between download and import
    pub settle_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            remote_storage: "http://localhost:8000/scene/".to_string(),
            forced_type: "dae".to_string(),
            settle_delay_ms: 10,
            timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Load configuration.
    ///
    /// With `path`, that file must exist. Without it, `scenelink.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
