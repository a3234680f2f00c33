//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid PORT '{0}'")]
    InvalidPort(String),

    #[error("Unknown DATA_SOURCE '{0}' (expected memory, fs or postgres)")]
    UnknownDataSource(String),

    #[error("Unknown LOG_FORMAT '{0}' (expected pretty or json)")]
    UnknownLogFormat(String),

    #[error("DATABASE_URL is required when DATA_SOURCE is postgres")]
    MissingDatabaseUrl,
}

/// Persistence backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSource {
    #[default]
    Memory,
    Fs,
    Postgres,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Memory => "memory",
            DataSource::Fs => "fs",
            DataSource::Postgres => "postgres",
        }
    }
}

impl FromStr for DataSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(DataSource::Memory),
            "fs" | "file" => Ok(DataSource::Fs),
            "postgres" | "pg" | "db" | "mdb" => Ok(DataSource::Postgres),
            _ => Err(ConfigError::UnknownDataSource(s.to_string())),
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::UnknownLogFormat(s.to_string())),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATA_SOURCE`: `memory`, `fs` or `postgres` (default: `memory`)
/// - `DATA_DIR`: directory for the `fs` backend (default: `"./data"`)
/// - `DATABASE_URL`: connection string, required for `postgres`
/// - `SEED_PRODUCTS`: optional JSON file of products loaded at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub data_source: DataSource,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub seed_products: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(p) => p.parse().map_err(|_| ConfigError::InvalidPort(p))?,
            None => defaults.port,
        };
        let log_format = lookup("LOG_FORMAT")
            .map(|f| f.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();
        let data_source = lookup("DATA_SOURCE")
            .map(|s| s.parse::<DataSource>())
            .transpose()?
            .unwrap_or_default();
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if data_source == DataSource::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            data_source,
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            database_url,
            seed_products: lookup("SEED_PRODUCTS").map(PathBuf::from),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            data_source: DataSource::Memory,
            data_dir: PathBuf::from("./data"),
            database_url: None,
            seed_products: None,
        }
    }
}
