//! Configuration loading and persistence.
//!
//! Layering, lowest to highest priority: defaults, `config.json` in the
//! config directory, `RUNNER_BRIDGE_*` environment variables, then CLI flags
//! (applied by the binary).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};

use crate::constants::{
    DEFAULT_HOST, DEFAULT_INSTANCE_ADD_DELAY_MS, DEFAULT_MAX_RETRIES, DEFAULT_PORT,
    DEFAULT_RETRY_TIMEOUT_MS,
};
use crate::transport::RetryPolicy;

const CONFIG_FILE: &str = "config.json";

/// Configuration for the bridge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Runner host name or address.
    pub host: String,
    /// Runner WebSocket port.
    pub port: u16,
    /// Connection attempts per reconnect cycle.
    pub max_retries: u32,
    /// Delay between failed attempts, in milliseconds.
    pub retry_timeout_ms: u64,
    /// Delay before requesting a newly added instance, in milliseconds.
    pub instance_add_delay_ms: u64,
    /// Append logs here instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_timeout_ms: DEFAULT_RETRY_TIMEOUT_MS,
            instance_add_delay_ms: DEFAULT_INSTANCE_ADD_DELAY_MS,
            log_file: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `RUNNER_BRIDGE_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("RUNNER_BRIDGE_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("runner-bridge")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides. A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = Self::load_from(&dir).unwrap_or_else(|e| {
            log::debug!("Using default config: {:#}", e);
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `config.json` from `dir`, without environment overrides.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("RUNNER_BRIDGE_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("RUNNER_BRIDGE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            }
        }

        if let Ok(max_retries) = std::env::var("RUNNER_BRIDGE_MAX_RETRIES") {
            if let Ok(max) = max_retries.parse::<u32>() {
                self.max_retries = max;
            }
        }

        if let Ok(retry_timeout) = std::env::var("RUNNER_BRIDGE_RETRY_TIMEOUT_MS") {
            if let Ok(ms) = retry_timeout.parse::<u64>() {
                self.retry_timeout_ms = ms;
            }
        }

        if let Ok(delay) = std::env::var("RUNNER_BRIDGE_INSTANCE_ADD_DELAY_MS") {
            if let Ok(ms) = delay.parse::<u64>() {
                self.instance_add_delay_ms = ms;
            }
        }

        if let Ok(log_file) = std::env::var("RUNNER_BRIDGE_LOG_FILE") {
            self.log_file = Some(PathBuf::from(log_file));
        }
    }

    /// Persists the current configuration to the config directory.
    pub fn save(&self) -> Result<PathBuf> {
        self.save_to(&Self::config_dir()?)
    }

    /// Write `config.json` into `dir` as pretty JSON.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// WebSocket endpoint, `ws://<host>:<port>`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        crate::ws::endpoint_url(&self.host, self.port)
    }

    /// Retry policy for the transport.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_timeout_ms))
    }

    /// Delay before requesting a newly added instance.
    #[must_use]
    pub fn instance_add_delay(&self) -> Duration {
        Duration::from_millis(self.instance_add_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5678);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.retry_timeout_ms, 500);
        assert_eq!(config.endpoint(), "ws://localhost:5678");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config {
            max_retries: 3,
            retry_timeout_ms: 250,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.retry_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            host: "c74rpi.local".to_string(),
            port: 9000,
            ..Config::default()
        };
        config.save_to(dir.path()).unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{"host": "10.0.0.5"}"#).unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.instance_add_delay_ms, DEFAULT_INSTANCE_ADD_DELAY_MS);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_log_file_not_serialized_when_unset() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(!json.contains("log_file"));
    }
}
