//! TOML configuration for the client.
//!
//! Stored as `client.toml` in the platform config directory (same layout
//! as the server's `server.toml`).  A missing file means defaults:
//!
//! ```toml
//! [client]
//! log_level = "warn"
//! lock_timeout_secs = 30
//!
//! [server]
//! host = "camera-bench.local"
//! port = 985
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use camlink_core::protocol::messages::{DEFAULT_CONTROL_PORT, MAX_PAYLOAD_BYTES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::EngineOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: GeneralConfig,
    #[serde(default)]
    pub server: ServerEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long a command may wait for the single-flight lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Largest reply payload accepted from the server.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

/// Where the camera server listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_log_level() -> String {
    "warn".to_string()
}
fn default_lock_timeout_secs() -> u64 {
    30
}
fn default_max_payload_bytes() -> usize {
    MAX_PAYLOAD_BYTES
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lock_timeout_secs: default_lock_timeout_secs(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ClientConfig {
    /// Engine tunables derived from the `[client]` section.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            lock_timeout: Duration::from_secs(self.client.lock_timeout_secs),
            max_payload: self.client.max_payload_bytes,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("client.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or from [`config_file_path`] when `None`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("camlink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("camlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("camlink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_local_control_port() {
        let cfg = ClientConfig::default();

        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 985);
        assert_eq!(cfg.engine_options().lock_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        // Arrange
        let toml_str = "[server]\nhost = \"bench-7\"\n\n[client]\nlock_timeout_secs = 2\n";

        // Act
        let cfg: ClientConfig = toml::from_str(toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg.server.host, "bench-7");
        assert_eq!(cfg.server.port, 985);
        assert_eq!(cfg.engine_options().lock_timeout, Duration::from_secs(2));
        assert_eq!(cfg.client.log_level, "warn");
    }

    #[test]
    fn test_save_then_load_from_explicit_path() {
        let dir = std::env::temp_dir().join(format!("camlink-client-{}", uuid::Uuid::new_v4()));
        let path = dir.join("client.toml");
        let mut cfg = ClientConfig::default();
        cfg.server.port = 9985;

        save_config(&cfg, &path).expect("save");
        let loaded = load_config(Some(&path)).expect("load");

        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let dir = std::env::temp_dir().join(format!("camlink-client-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("client.toml");
        std::fs::write(&path, "[server\nport = 1").unwrap();

        let result = load_config(Some(&path));

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
