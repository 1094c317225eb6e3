//! Configuration module for the echo gateway.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the gateway
#[derive(Parser, Debug)]
#[command(name = "echo-gateway")]
#[command(version = "0.1.0")]
#[command(about = "A multi-protocol echo gateway", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hostname to listen on (e.g., 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Run as a FastCGI server (default)
    #[arg(long)]
    pub fcgi: bool,

    /// Run as a CGI program handling one request from stdin
    #[arg(long)]
    pub cgi: bool,

    /// Run as an SCGI server
    #[arg(long)]
    pub scgi: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Gateway protocol spoken by the listener, selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// FastCGI over TCP, sequential requests per connection
    Fcgi,
    /// SCGI over TCP, one request per connection
    Scgi,
    /// One-shot CGI over inherited standard streams
    Cgi,
}

impl TransportType {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "fcgi" => Some(TransportType::Fcgi),
            "scgi" => Some(TransportType::Scgi),
            "cgi" => Some(TransportType::Cgi),
            _ => None,
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Hostname to listen on
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Gateway protocol: "fcgi", "scgi", or "cgi"
    pub transport: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: None,
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

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub transport: TransportType,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    /// Resolve already-parsed CLI arguments against the optional TOML file.
    pub fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // The transport flags are mutually exclusive
        let flags = [cli.fcgi, cli.scgi, cli.cgi];
        if flags.iter().filter(|&&f| f).count() > 1 {
            return Err(ConfigError::ConflictingTransports);
        }

        let transport = if cli.fcgi {
            TransportType::Fcgi
        } else if cli.scgi {
            TransportType::Scgi
        } else if cli.cgi {
            TransportType::Cgi
        } else {
            match toml_config.server.transport {
                Some(ref name) => TransportType::from_name(name)
                    .ok_or_else(|| ConfigError::InvalidTransport(name.clone()))?,
                None => TransportType::Fcgi,
            }
        };

        let port = cli.port.unwrap_or(toml_config.server.port);
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port,
            transport,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Address string for binding the TCP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    ConflictingTransports,
    InvalidPort(u16),
    InvalidTransport(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ConflictingTransports => {
                write!(f, "--fcgi, --scgi, and --cgi are mutually exclusive")
            }
            ConfigError::InvalidPort(port) => write!(f, "Invalid port: {}", port),
            ConfigError::InvalidTransport(name) => write!(f, "Unknown transport: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {}
