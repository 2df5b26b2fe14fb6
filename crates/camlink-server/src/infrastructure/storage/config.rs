//! TOML configuration for the camera server.
//!
//! Looked up at an explicit path (`--config`) or in the platform config
//! directory:
//! - Windows:  `%APPDATA%\camlink\server.toml`
//! - Linux:    `~/.config/camlink/server.toml`
//! - macOS:    `~/Library/Application Support/camlink/server.toml`
//!
//! A missing file means "all defaults".  Every section and field is
//! optional:
//!
//! ```toml
//! [server]
//! log_level = "debug"
//! lock_timeout_secs = 30
//!
//! [network]
//! control_port = 985
//!
//! [trigger]
//! kind = "udp"
//! port = 1911
//!
//! [ring]
//! size = 50
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use camlink_core::protocol::messages::{
    DEFAULT_CONTROL_PORT, DEFAULT_TRIGGER_PORT, MAX_PAYLOAD_BYTES,
};
use camlink_core::RING_DEFAULT_SIZE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::camera::simulated::SimulatedCameraConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An address field is not a valid IP address.
    #[error("invalid address {value:?} in [{section}]")]
    InvalidAddress { section: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub ring: RingConfig,
    #[serde(default)]
    pub burst: BurstConfig,
    #[serde(default)]
    pub camera: SimulatedCameraConfig,
}

/// Process-wide behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long a request may wait for the single-flight lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Slack on top of the exposure time before an acquisition is abandoned.
    #[serde(default = "default_acquire_margin_ms")]
    pub acquire_margin_ms: u64,
}

/// Control channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port for the control exchange.
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    /// Largest request payload accepted from a client.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

/// Which trigger source the burst coordinator listens to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// `START` / `END` datagrams on the trigger port.
    Udp,
    /// No trigger; BURST_ARM always fails.
    Disabled,
}

/// Trigger listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    #[serde(default = "default_trigger_kind")]
    pub kind: TriggerKind,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_trigger_port")]
    pub port: u16,
}

/// Frame store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RingConfig {
    /// Initial ring capacity in frames.
    #[serde(default = "default_ring_size")]
    pub size: usize,
}

/// Burst coordinator timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BurstConfig {
    /// Slice length while waiting for the start event.
    #[serde(default = "default_start_poll_ms")]
    pub start_poll_ms: u64,
    /// Wait for the end event between captured frames.
    #[serde(default = "default_end_poll_ms")]
    pub end_poll_ms: u64,
    /// Longest a running burst may last before it is completed.
    #[serde(default = "default_ceiling_secs")]
    pub ceiling_secs: u64,
    /// How long BURST_ARM waits for the coordinator to leave ARM_REQUEST.
    #[serde(default = "default_arm_wait_ms")]
    pub arm_wait_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_lock_timeout_secs() -> u64 {
    30
}
fn default_acquire_margin_ms() -> u64 {
    2000
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}
fn default_max_payload_bytes() -> usize {
    MAX_PAYLOAD_BYTES
}
fn default_trigger_kind() -> TriggerKind {
    TriggerKind::Udp
}
fn default_trigger_port() -> u16 {
    DEFAULT_TRIGGER_PORT
}
fn default_ring_size() -> usize {
    RING_DEFAULT_SIZE
}
fn default_start_poll_ms() -> u64 {
    250
}
fn default_end_poll_ms() -> u64 {
    1
}
fn default_ceiling_secs() -> u64 {
    10
}
fn default_arm_wait_ms() -> u64 {
    1000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lock_timeout_secs: default_lock_timeout_secs(),
            acquire_margin_ms: default_acquire_margin_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            control_port: default_control_port(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            kind: default_trigger_kind(),
            bind_address: default_bind_address(),
            port: default_trigger_port(),
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            size: default_ring_size(),
        }
    }
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            start_poll_ms: default_start_poll_ms(),
            end_poll_ms: default_end_poll_ms(),
            ceiling_secs: default_ceiling_secs(),
            arm_wait_ms: default_arm_wait_ms(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl GeneralConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn acquire_margin(&self) -> Duration {
        Duration::from_millis(self.acquire_margin_ms)
    }
}

impl NetworkConfig {
    /// Socket address for the control listener.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP.
    pub fn control_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("network", &self.bind_address, self.control_port)
    }
}

impl TriggerConfig {
    /// Socket address for the trigger listener.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP.
    pub fn trigger_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("trigger", &self.bind_address, self.port)
    }
}

fn parse_addr(section: &'static str, value: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let ip: IpAddr = value.parse().map_err(|_| ConfigError::InvalidAddress {
        section,
        value: value.to_string(),
    })?;
    Ok(SocketAddr::new(ip, port))
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
        .map(|dir| dir.join("server.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or from [`config_file_path`] when `None`.
///
/// Returns [`ServerConfig::default()`] if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig, path: &Path) -> Result<(), ConfigError> {
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

/// Resolves the platform config directory including the `camlink` subdirectory.
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

// ── Tests ─────────────────────────────────────────────────────────────────────
