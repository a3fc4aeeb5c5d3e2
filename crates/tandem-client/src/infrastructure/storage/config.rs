//! TOML-based configuration for the client.
//!
//! # Example file
//!
//! ```toml
//! server_address = "127.0.0.1"
//! port = 26950
//! buffer_size = 4096
//! username = "alice"
//! tick_rate_hz = 30
//! log_level = "info"
//! ```
//!
//! Every field is optional; a missing file yields [`ClientConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
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

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host name or IP address of the server.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Server port (TCP and UDP).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Socket buffer size and per-read buffer length, in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Name sent to the server in `WelcomeResponse`.
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_server_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    26950
}
fn default_buffer_size() -> usize {
    4096
}
fn default_username() -> String {
    "username".to_string()
}
fn default_tick_rate_hz() -> u32 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            port: default_port(),
            buffer_size: default_buffer_size(),
            username: default_username(),
            tick_rate_hz: default_tick_rate_hz(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    pub const MIN_BUFFER_SIZE: usize = 64;

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::Invalid("server_address must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.buffer_size < Self::MIN_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "buffer_size must be at least {}, got {}",
                Self::MIN_BUFFER_SIZE,
                self.buffer_size
            )));
        }
        if !(1..=1000).contains(&self.tick_rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "tick_rate_hz must be in 1..=1000, got {}",
                self.tick_rate_hz
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

/// Loads `ClientConfig` from `path`, returning the default if the file does
/// not exist.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`] for
/// out-of-range values.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<ClientConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ClientConfig::default(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Persists `config` to `path` as pretty-printed TOML.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
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
