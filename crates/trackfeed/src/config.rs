//! Configuration management for trackfeed.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ticker::DEFAULT_PAGE_SIZE;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "trackfeed";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "tracks.db";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "TRACKFEED_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TRACKFEED_`, sections separated by
///    a double underscore, e.g. `TRACKFEED_TICKER__PAGE_SIZE=10`)
/// 2. TOML config file at `~/.config/trackfeed/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Ticker configuration.
    pub ticker: TickerConfig,
    /// Change notifier configuration.
    pub notifier: NotifierConfig,
    /// Track download configuration.
    pub fetch: FetchConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/trackfeed/tracks.db`
    pub database_path: Option<PathBuf>,
}

/// Ticker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Maximum number of track ids per ticker page.
    pub page_size: usize,
}

/// Change notifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Run the background notifier alongside the server.
    pub enabled: bool,
    /// Seconds between two change checks.
    pub interval_secs: u64,
    /// Timeout for a single webhook delivery, in seconds.
    pub request_timeout_secs: u64,
}

/// Track download configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Timeout for downloading a track file, in seconds.
    pub timeout_secs: u64,
    /// Largest track file accepted, in bytes.
    pub max_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            request_timeout_secs: 10,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.ticker.page_size == 0 {
            return Err(Error::ConfigValidation {
                message: "ticker.page_size must be greater than 0".to_string(),
            });
        }

        if self.notifier.interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "notifier.interval_secs must be greater than 0".to_string(),
            });
        }

        if self.fetch.max_bytes == 0 {
            return Err(Error::ConfigValidation {
                message: "fetch.max_bytes must be greater than 0".to_string(),
            });
        }

        self.bind_address()?;
        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the socket address the server binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if `server.host` is not an IP address.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid server.host: {}", self.server.host),
            })
    }

    /// Get the notifier tick interval as a Duration.
    #[must_use]
    pub fn notifier_interval(&self) -> Duration {
        Duration::from_secs(self.notifier.interval_secs)
    }

    /// Get the webhook delivery timeout as a Duration.
    #[must_use]
    pub fn notifier_request_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier.request_timeout_secs)
    }

    /// Get the track download timeout as a Duration.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}
