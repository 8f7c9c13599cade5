//! Daemon configuration.
//!
//! Values come from three layers, lowest precedence first:
//! built-in defaults, a TOML file, then command-line flags and environment
//! variables (applied by the CLI on top of the loaded config).
//!
//! ```toml
//! listen = "0.0.0.0:50051"
//! max_connections = 1024
//! outbound_queue = 256
//! max_message_size = 65536
//! write_timeout_secs = 10
//! idle_timeout_secs = 0
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_protocol::MAX_MESSAGE_SIZE;

/// Default listen address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:50051";

/// File name looked up under the user's config directory
const CONFIG_FILE: &str = "parleyd.toml";

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Server configuration. Every key is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP address to listen on.
    pub listen: SocketAddr,
    /// Maximum simultaneously open connections.
    pub max_connections: usize,
    /// Per-connection outbound queue length, in frames.
    pub outbound_queue: usize,
    /// Longest accepted inbound line, in bytes.
    pub max_message_size: usize,
    /// Upper bound on a single frame write.
    pub write_timeout_secs: u64,
    /// Disconnect clients that send nothing for this long (0 disables).
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 50051)),
            max_connections: 1024,
            outbound_queue: 256,
            max_message_size: MAX_MESSAGE_SIZE,
            write_timeout_secs: 10,
            idle_timeout_secs: 0,
        }
    }
}

impl ServerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolves the file layer.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used when present and built-in defaults otherwise.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading config");
            return Self::load(path);
        }

        match default_path() {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "Loading config");
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "max_connections",
                reason: "must be at least 1",
            });
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid {
                field: "outbound_queue",
                reason: "must be at least 1",
            });
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_message_size",
                reason: "must be at least 1",
            });
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "write_timeout_secs",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Returns the idle read timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Returns `<config dir>/parley/parleyd.toml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join(CONFIG_FILE))
}
