use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://workout-tracker.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

pub fn load_environment() -> Result<()> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string())
            == "production";

    let env_files = if is_production {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)
        .with_context(|| format!("Failed to load environment file {}", path))?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Process configuration read from the environment once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_busy_timeout_ms: u64,
    pub deployment_environment: String,
    pub otlp_endpoint: Option<String>,
    pub otlp_api_key_header: Option<String>,
    pub otlp_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            database_busy_timeout_ms: parse_var("DATABASE_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?,
            deployment_environment: var_or("DEPLOYMENT_ENVIRONMENT", "development"),
            otlp_endpoint: optional_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otlp_api_key_header: optional_var("OTLP_API_KEY_HEADER"),
            otlp_api_key: optional_var("OTLP_API_KEY"),
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    optional_var(key).unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 7] = [
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "DATABASE_BUSY_TIMEOUT_MS",
        "DEPLOYMENT_ENVIRONMENT",
        "OTEL_EXPORTER_OTLP_ENDPOINT",
        "OTLP_API_KEY_HEADER",
        "OTLP_API_KEY",
    ];

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        temp_env::with_vars_unset(KEYS, || {
            let config = AppConfig::from_env().unwrap();
            assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
            assert_eq!(config.database_max_connections, 5);
            assert_eq!(config.database_busy_timeout_ms, 5000);
            assert_eq!(config.deployment_environment, "development");
            assert_eq!(config.otlp_endpoint, None);
        });
    }

    #[test]
    #[serial]
    fn values_are_read_from_environment() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("sqlite://other.db")),
                ("DATABASE_MAX_CONNECTIONS", Some("12")),
                ("DATABASE_BUSY_TIMEOUT_MS", Some("250")),
                ("DEPLOYMENT_ENVIRONMENT", Some("production")),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", Some("https://otel.example:4317")),
                ("OTLP_API_KEY_HEADER", Some("x-api-key")),
                ("OTLP_API_KEY", Some("secret")),
            ],
            || {
                let config = AppConfig::from_env().unwrap();
                assert_eq!(config.database_url, "sqlite://other.db");
                assert_eq!(config.database_max_connections, 12);
                assert_eq!(config.database_busy_timeout_ms, 250);
                assert_eq!(config.deployment_environment, "production");
                assert_eq!(
                    config.otlp_endpoint.as_deref(),
                    Some("https://otel.example:4317")
                );
                assert_eq!(config.otlp_api_key_header.as_deref(), Some("x-api-key"));
                assert_eq!(config.otlp_api_key.as_deref(), Some("secret"));
            },
        );
    }

    #[test]
    #[serial]
    fn malformed_numbers_are_rejected() {
        temp_env::with_var("DATABASE_MAX_CONNECTIONS", Some("lots"), || {
            let err = AppConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));
        });
    }

    #[test]
    #[serial]
    fn blank_values_fall_back_to_defaults() {
        temp_env::with_vars(
            [("DATABASE_URL", Some("  ")), ("OTLP_API_KEY", Some(""))],
            || {
                let config = AppConfig::from_env().unwrap();
                assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
                assert_eq!(config.otlp_api_key, None);
            },
        );
    }
}
