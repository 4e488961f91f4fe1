//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use syllabus_core::config::PipelineConfig;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Without a key the semantic tie-break is switched off.
    pub openai_api_key: Option<String>,
    pub embedding_model: String,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let embedding_model =
            std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string());

        // --- Load Pipeline Tunables ---
        let defaults = PipelineConfig::default();
        let max_upload_mb: u64 = parse_var("MAX_UPLOAD_MB", Some(defaults.max_file_bytes / (1024 * 1024)))?;
        let pipeline = PipelineConfig {
            max_file_bytes: upload_limit_bytes(max_upload_mb)?,
            rate_limit_max_uploads: parse_var("UPLOAD_RATE_LIMIT", Some(defaults.rate_limit_max_uploads))?,
            rate_limit_window_secs: parse_var("UPLOAD_RATE_WINDOW_SECS", Some(defaults.rate_limit_window_secs))?,
            min_text_chars: parse_var("MIN_TEXT_CHARS", Some(defaults.min_text_chars))?,
            augmentation_timeout: Duration::from_millis(parse_var(
                "AUGMENTATION_TIMEOUT_MS",
                Some(defaults.augmentation_timeout.as_millis() as u64),
            )?),
            ..defaults
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            embedding_model,
            pipeline,
        })
    }
}

fn upload_limit_bytes(megabytes: u64) -> Result<u64, ConfigError> {
    megabytes.checked_mul(1024 * 1024).ok_or_else(|| {
        ConfigError::InvalidValue(
            "MAX_UPLOAD_MB".to_string(),
            format!("{megabytes} MB does not fit in a byte count"),
        )
    })
}

/// Reads and parses `name`, falling back to `default` when it is unset.
fn parse_var<T>(name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}
