//! Configuration management for the exporter.
//!
//! Settings are merged from several layers, with clear precedence rules:
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (specified with --config)
//! 3. Command-line arguments and environment variables (highest priority)
//!
//! The merged [`Config`] is then resolved into an [`ExporterConfig`], which has
//! no optional fields and is handed to the acquirer and the HTTP server.
//!
//! # Example Configuration File
//!
//! ```toml
//! metrics_path = "/metrics"
//! ipahealthcheck_path = "/usr/bin/ipa-healthcheck"
//! ipahealthcheck_log_path = "/var/log/ipa/healthcheck/healthcheck.log"
//! address = "0.0.0.0"
//! port = 9888
//! sudo = false
//! verbose = false
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_IPAHEALTHCHECK_PATH: &str = "/usr/bin/ipa-healthcheck";
pub const DEFAULT_IPAHEALTHCHECK_LOG_PATH: &str = "/var/log/ipa/healthcheck/healthcheck.log";
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9888;
const SHM_DIR: &str = "/dev/shm";

/// Layered configuration.
///
/// All fields are optional to support partial configuration and merging.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Path under which to expose the metrics
    pub metrics_path: Option<String>,
    /// Path to the ipa-healthcheck tool
    pub ipahealthcheck_path: Option<PathBuf>,
    /// Path to the report written by the background ipa-healthcheck runs
    pub ipahealthcheck_log_path: Option<PathBuf>,
    /// Address to bind the HTTP server to
    pub address: Option<String>,
    /// Port on which to expose metrics
    pub port: Option<u16>,
    /// Run ipa-healthcheck through sudo
    pub sudo: Option<bool>,
    /// Enable debug logging
    pub verbose: Option<bool>,
    /// Directory for the per-scrape report file
    pub temp_dir: Option<PathBuf>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    pub metrics_path: String,
    pub ipahealthcheck_path: PathBuf,
    pub ipahealthcheck_log_path: PathBuf,
    pub address: IpAddr,
    pub port: u16,
    pub sudo: bool,
    pub verbose: bool,
    pub temp_dir: PathBuf,
}

impl ExporterConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Creates a configuration holding every default value.
    ///
    /// `temp_dir` defaults to `/dev/shm` where it exists, otherwise to the
    /// system temporary directory.
    pub fn defaults() -> Self {
        let shm = Path::new(SHM_DIR);
        let temp_dir = if shm.is_dir() {
            shm.to_path_buf()
        } else {
            std::env::temp_dir()
        };

        Config {
            metrics_path: Some(DEFAULT_METRICS_PATH.to_string()),
            ipahealthcheck_path: Some(PathBuf::from(DEFAULT_IPAHEALTHCHECK_PATH)),
            ipahealthcheck_log_path: Some(PathBuf::from(DEFAULT_IPAHEALTHCHECK_LOG_PATH)),
            address: Some(DEFAULT_ADDRESS.to_string()),
            port: Some(DEFAULT_PORT),
            sudo: Some(false),
            verbose: Some(false),
            temp_dir: Some(temp_dir),
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if `other` has a value it overrides this config's value.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.metrics_path.is_some() {
            self.metrics_path = other.metrics_path;
        }
        if other.ipahealthcheck_path.is_some() {
            self.ipahealthcheck_path = other.ipahealthcheck_path;
        }
        if other.ipahealthcheck_log_path.is_some() {
            self.ipahealthcheck_log_path = other.ipahealthcheck_log_path;
        }
        if other.address.is_some() {
            self.address = other.address;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.sudo.is_some() {
            self.sudo = other.sudo;
        }
        if other.verbose.is_some() {
            self.verbose = other.verbose;
        }
        if other.temp_dir.is_some() {
            self.temp_dir = other.temp_dir;
        }
        self
    }

    /// Creates a Config from command-line arguments for merging.
    ///
    /// Only provided arguments (Some values) will override other
    /// configurations. Boolean switches can only turn a setting on, so an
    /// absent `--sudo` does not override `sudo = true` from a file.
    ///
    /// # Arguments
    ///
    /// * `metrics_path` - Path under which to expose the metrics
    /// * `ipahealthcheck_path` - Path to the ipa-healthcheck tool
    /// * `ipahealthcheck_log_path` - Path to the logged report
    /// * `address` - Address to bind the HTTP server to
    /// * `port` - Port on which to expose metrics
    /// * `sudo` - Whether `--sudo` was given
    /// * `verbose` - Whether `--verbose` was given
    /// * `temp_dir` - Directory for the per-scrape report file
    ///
    /// # Returns
    ///
    /// A `Config` struct with only the specified CLI values set.
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli_args(
        metrics_path: Option<String>,
        ipahealthcheck_path: Option<PathBuf>,
        ipahealthcheck_log_path: Option<PathBuf>,
        address: Option<String>,
        port: Option<u16>,
        sudo: bool,
        verbose: bool,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        Config {
            metrics_path,
            ipahealthcheck_path,
            ipahealthcheck_log_path,
            address,
            port,
            sudo: sudo.then_some(true),
            verbose: verbose.then_some(true),
            temp_dir,
        }
    }

    /// Validates the merged configuration and fills any gaps with defaults.
    pub fn resolve(self) -> Result<ExporterConfig, ConfigError> {
        let config = Config::defaults().merge_with(self);

        let metrics_path = config.metrics_path.unwrap_or_default();
        if !metrics_path.starts_with('/') || metrics_path == "/" {
            return Err(ConfigError::Validation(format!(
                "metrics path '{}' must start with '/' and cannot be the index page",
                metrics_path
            )));
        }

        let address = config.address.unwrap_or_default();
        let address: IpAddr = address.parse().map_err(|_| {
            ConfigError::Validation(format!("'{}' is not a valid IP address", address))
        })?;

        let ipahealthcheck_path = config.ipahealthcheck_path.unwrap_or_default();
        if ipahealthcheck_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "ipa-healthcheck path cannot be empty".to_string(),
            ));
        }

        Ok(ExporterConfig {
            metrics_path,
            ipahealthcheck_path,
            ipahealthcheck_log_path: config.ipahealthcheck_log_path.unwrap_or_default(),
            address,
            port: config.port.unwrap_or(DEFAULT_PORT),
            sudo: config.sudo.unwrap_or(false),
            verbose: config.verbose.unwrap_or(false),
            temp_dir: config.temp_dir.unwrap_or_else(std::env::temp_dir),
        })
    }

    /// Generates an example configuration file in TOML format.
    pub fn example_toml() -> String {
        let example = Config {
            metrics_path: Some(DEFAULT_METRICS_PATH.to_string()),
            ipahealthcheck_path: Some(PathBuf::from(DEFAULT_IPAHEALTHCHECK_PATH)),
            ipahealthcheck_log_path: Some(PathBuf::from(DEFAULT_IPAHEALTHCHECK_LOG_PATH)),
            address: Some(DEFAULT_ADDRESS.to_string()),
            port: Some(DEFAULT_PORT),
            sudo: Some(true),
            verbose: Some(false),
            temp_dir: Some(PathBuf::from(SHM_DIR)),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (invalid values)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
