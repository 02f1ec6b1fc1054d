//! Startup configuration.
//!
//! Values resolve in three layers: built-in defaults, then the persisted
//! configuration document, then environment variables. A config is read
//! once at process start and never changes for the life of a server
//! instance; changing the port means stop and start again.

use crate::DEFAULT_PORT;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Overrides the configured port.
pub const ENV_PORT: &str = "SCENELINK_PORT";

/// `"1"` enables auto-start, `"0"` disables it.
pub const ENV_START_NOW: &str = "SCENELINK_START_NOW";

/// `"1"` forces debug-level logging.
pub const ENV_DEBUG: &str = "SCENELINK_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port the endpoint listens on. 0 picks an ephemeral port.
    pub port: u16,

    /// Whether the lifecycle glue starts the server without being asked.
    pub auto_start: bool,

    /// Default log filter, overridden by `RUST_LOG` when set.
    pub log_level: String,

    /// Keep-alive beat in milliseconds.
    pub tick_period_ms: u64,

    /// Per-connection read and write deadline, in seconds.
    pub io_timeout_secs: u64,

    /// How long an I/O task waits on the main thread, in seconds.
    pub bridge_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: DEFAULT_PORT,
            auto_start: true,
            log_level: "info".into(),
            tick_period_ms: 50,
            io_timeout_secs: 30,
            bridge_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Resolve the effective configuration: defaults, then the persisted
    /// document if one exists, then the environment.
    pub fn load() -> Config {
        let mut config = match Config::config_path() {
            Some(path) if path.exists() => match Config::from_file(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(path = %path.display(), cause = %err, "ignoring unreadable configuration");
                    Config::default()
                }
            },
            _ => Config::default(),
        };
        config.apply_env(std::env::vars());
        config
    }

    /// Read a configuration document. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> crate::Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Platform-appropriate location of the persisted document.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scenelink").join("config.json"))
    }

    /// Apply environment overrides. Exposed over an iterator so the merge
    /// is testable without touching the process environment.
    pub fn apply_env(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            match key.as_str() {
                ENV_PORT => match value.parse() {
                    Ok(port) => self.port = port,
                    Err(_) => warn!(%value, "ignoring unparsable port override"),
                },
                ENV_START_NOW => self.auto_start = value == "1",
                ENV_DEBUG => {
                    if value == "1" {
                        self.log_level = "debug".into();
                    }
                }
                _ => {}
            }
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Iterator<Item = (String, String)> + 'a {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = Config::default();
        config.apply_env(vars(&[
            ("SCENELINK_PORT", "17777"),
            ("SCENELINK_START_NOW", "0"),
            ("SCENELINK_DEBUG", "1"),
        ]));
        assert_eq!(config.port, 17777);
        assert!(!config.auto_start);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn unparsable_port_is_ignored() {
        let mut config = Config::default();
        config.apply_env(vars(&[("SCENELINK_PORT", "not-a-port")]));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{ "port": 7000 }"#).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.tick_period_ms, 50);
    }
}
