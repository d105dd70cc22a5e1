//! Session configuration management.
//!
//! Static settings (endpoint, fallback timeout, activity throttle) load
//! from `~/.config/sessionwatch/config.json`. The inactivity timeout
//! itself is fetched from the server once per session; the value here is
//! only the fallback when that policy query fails.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/storage directory paths
const APP_NAME: &str = "sessionwatch";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Fallback inactivity timeout when the server policy is unavailable.
/// Matches the server's own default so an offline start behaves the same.
const DEFAULT_TIMEOUT_MINUTES: u64 = 30;

/// Minimum interval between activity callbacks. One second is far below
/// any deadline granularity while keeping pointer-move bursts cheap.
const DEFAULT_ACTIVITY_THROTTLE_MS: u64 = 1_000;

fn default_endpoint() -> String {
    "http://localhost:4000/graphql".to_string()
}

fn default_timeout_minutes() -> u64 {
    DEFAULT_TIMEOUT_MINUTES
}

fn default_activity_throttle_ms() -> u64 {
    DEFAULT_ACTIVITY_THROTTLE_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// GraphQL endpoint handling the session operations.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Fallback inactivity timeout in minutes. The server-supplied policy
    /// is authoritative when reachable.
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: u64,
    /// Activity signal throttle in milliseconds.
    #[serde(default = "default_activity_throttle_ms")]
    pub activity_throttle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_timeout_minutes: default_timeout_minutes(),
            activity_throttle_ms: default_activity_throttle_ms(),
        }
    }
}

impl SessionConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_minutes * 60)
    }

    pub fn activity_throttle(&self) -> Duration {
        Duration::from_millis(self.activity_throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").expect("empty config parses");
        assert_eq!(config.default_timeout_minutes, 30);
        assert_eq!(config.activity_throttle_ms, 1_000);
        assert_eq!(config.default_timeout(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn partial_config_keeps_explicit_values() {
        let config: SessionConfig = serde_json::from_str(r#"{"default_timeout_minutes": 10}"#)
            .expect("partial config parses");
        assert_eq!(config.default_timeout(), Duration::from_secs(10 * 60));
        assert_eq!(config.activity_throttle_ms, 1_000);
    }
}
