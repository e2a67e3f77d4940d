//! Configuration module for the line reactor.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the reactor
#[derive(Parser, Debug, Default)]
#[command(name = "line-reactor")]
#[command(author = "line-reactor authors")]
#[command(version = "0.1.0")]
#[command(about = "A multi-client line-oriented TCP service", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:6666)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of concurrently connected clients
    #[arg(short = 'n', long)]
    pub max_clients: Option<usize>,

    /// Per-client input buffer size in bytes (longest framed message)
    #[arg(short = 'b', long)]
    pub buffer_size: Option<usize>,

    /// Ticks without input a client may sit through before it is dropped
    #[arg(short = 'i', long)]
    pub idle_limit: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener and client table configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Client table capacity
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Per-client buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_clients: default_max_clients(),
            buffer_size: default_buffer_size(),
            backlog: default_backlog(),
        }
    }
}

/// Timeout clock configuration
#[derive(Debug, Deserialize)]
pub struct TimeoutConfig {
    /// Upper bound on a single poll wait, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Clock tick interval in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval: u64,
    /// A client is timed out once its idle ticks exceed this value
    #[serde(default = "default_idle_limit")]
    pub idle_limit: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            tick_interval: default_tick_interval(),
            idle_limit: default_idle_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:6666".to_string()
}

fn default_max_clients() -> usize {
    32
}

fn default_buffer_size() -> usize {
    1024
}

fn default_backlog() -> i32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_tick_interval() -> u64 {
    60 // one minute
}

fn default_idle_limit() -> u32 {
    9
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub max_clients: usize,
    pub buffer_size: usize,
    pub backlog: i32,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub idle_limit: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve configuration from already-parsed CLI arguments.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents)
                .map_err(|source| ConfigError::TomlParse {
                    path: config_path.clone(),
                    source,
                })?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            max_clients: cli.max_clients.unwrap_or(toml_config.server.max_clients),
            buffer_size: cli.buffer_size.unwrap_or(toml_config.server.buffer_size),
            backlog: toml_config.server.backlog,
            poll_interval: Duration::from_millis(toml_config.timeout.poll_interval_ms),
            tick_interval: Duration::from_secs(toml_config.timeout.tick_interval),
            idle_limit: cli.idle_limit.unwrap_or(toml_config.timeout.idle_limit),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Reject settings the reactor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be at least 1".into()));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be at least 1".into()));
        }
        if self.backlog < 1 {
            return Err(ConfigError::Invalid("backlog must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.tick_interval.as_secs() == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval must be at least 1 second".into(),
            ));
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Parse the configured listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid listen address '{}'", self.listen)))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
