//! TOML-based configuration for the server.
//!
//! # Example file
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 26950
//! buffer_size = 4096
//! limit_of_connections = 50
//! tick_rate_hz = 30
//! greeting = "Welcome to the server!"
//! log_level = "info"
//!
//! [spawn_position]
//! x = 0.0
//! y = 1.0
//! z = 0.0
//! ```
//!
//! Every field is optional.  Fields annotated with
//! `#[serde(default = "some_fn")]` take the value of `some_fn()` when absent,
//! so a missing file and an empty file both yield [`ServerConfig::default`].

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_core::Vec3;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
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

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema ─────────────────────────────────────────────────────────────

/// Server settings.  Read once at construction; never changed while running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to bind both sockets to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port shared by the TCP listener and the UDP socket.  `0` lets the OS
    /// choose (useful in tests).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Socket send/receive buffer size and per-read buffer length, in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Maximum number of simultaneously registered clients.
    #[serde(default = "default_limit_of_connections")]
    pub limit_of_connections: usize,
    /// How many times per second the tick loop drains the dispatch queue.
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,
    /// Text sent in every `Welcome` packet.
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where the demo lobby spawns new players.
    #[serde(default = "default_spawn_position")]
    pub spawn_position: Vec3,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    26950
}
fn default_buffer_size() -> usize {
    4096
}
fn default_limit_of_connections() -> usize {
    50
}
fn default_tick_rate_hz() -> u32 {
    30
}
fn default_greeting() -> String {
    "Welcome to the server!".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_spawn_position() -> Vec3 {
    Vec3::new(0.0, 1.0, 0.0)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            buffer_size: default_buffer_size(),
            limit_of_connections: default_limit_of_connections(),
            tick_rate_hz: default_tick_rate_hz(),
            greeting: default_greeting(),
            log_level: default_log_level(),
            spawn_position: default_spawn_position(),
        }
    }
}

impl ServerConfig {
    /// Minimum accepted `buffer_size`.
    pub const MIN_BUFFER_SIZE: usize = 64;

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::Invalid(format!("bind_address {:?}: {e}", self.bind_address)))?;
        if self.buffer_size < Self::MIN_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "buffer_size must be at least {}, got {}",
                Self::MIN_BUFFER_SIZE,
                self.buffer_size
            )));
        }
        if self.limit_of_connections == 0 {
            return Err(ConfigError::Invalid("limit_of_connections must be at least 1".into()));
        }
        if !(1..=1000).contains(&self.tick_rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "tick_rate_hz must be in 1..=1000, got {}",
                self.tick_rate_hz
            )));
        }
        Ok(())
    }

    /// The address both sockets bind to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind_address {:?}: {e}", self.bind_address)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Interval between ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `ServerConfig` from `path`, returning `ServerConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<ServerConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ServerConfig::default(),
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

/// Persists `config` to `path` as pretty-printed TOML, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
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

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("tandem-server-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_default_matches_documented_values() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.port, 26950);
        assert_eq!(cfg.buffer_size, 4096);
        assert_eq!(cfg.limit_of_connections, 50);
        assert_eq!(cfg.tick_rate_hz, 30);
        assert_eq!(cfg.greeting, "Welcome to the server!");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_given_fields() {
        let cfg: ServerConfig = toml::from_str("port = 9000\nlimit_of_connections = 2").expect("parse");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.limit_of_connections, 2);
        assert_eq!(cfg.buffer_size, 4096);
    }

    #[test]
    fn test_zero_limit_is_invalid() {
        let cfg = ServerConfig {
            limit_of_connections: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_tiny_buffer_is_invalid() {
        let cfg = ServerConfig {
            buffer_size: 16,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bad_bind_address_is_invalid() {
        let cfg = ServerConfig {
            bind_address: "not-an-ip".into(),
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(cfg.socket_addr().is_err());
    }

    #[test]
    fn test_tick_interval_for_30hz() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tick_interval(), Duration::from_nanos(33_333_333));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let cfg = load_config(&temp_path("does-not-exist.toml")).expect("load");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = temp_path("round-trip/server.toml");
        let cfg = ServerConfig {
            port: 27000,
            greeting: "hi".into(),
            spawn_position: Vec3::new(1.0, 2.0, 3.0),
            ..ServerConfig::default()
        };

        // Act
        save_config(&path, &cfg).expect("save");
        let restored = load_config(&path).expect("load");

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let path = temp_path("bad/server.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
