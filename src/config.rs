//! Connection configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

/// Validated connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Human-readable identifier for this connection, used only in logs.
    pub name: String,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
    name: Option<String>,
    max_retries: Option<u32>,
    retry_interval_ms: Option<u64>,
}

/// Load config from a TOML file at `path`.
pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)?;
    load_config_from_str(&toml_str)
}

/// Load config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let host = raw
        .host
        .ok_or_else(|| ConfigError::MissingField("host".to_owned()))?;
    let port = raw
        .port
        .ok_or_else(|| ConfigError::MissingField("port".to_owned()))?;
    let password = raw
        .password
        .ok_or_else(|| ConfigError::MissingField("password".to_owned()))?;
    let name = raw
        .name
        .unwrap_or_else(|| format!("esl-{}", uuid::Uuid::new_v4()));

    Ok(Config {
        host,
        port,
        password,
        name,
        max_retries: raw.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        retry_interval_ms: raw.retry_interval_ms.unwrap_or(DEFAULT_RETRY_INTERVAL_MS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_applies_defaults() {
        let cfg = load_config_from_str(
            r#"
            host = "127.0.0.1"
            port = 8021
            password = "ClueCon"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8021);
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(cfg.retry_interval_ms, DEFAULT_RETRY_INTERVAL_MS);
        assert!(cfg.name.starts_with("esl-"));
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let cfg = load_config_from_str(
            r#"
            host = "fs.internal"
            port = 8021
            password = "ClueCon"
            name = "dialplan-watcher"
            max_retries = 3
            retry_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.name, "dialplan-watcher");
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_interval_ms, 500);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let err = load_config_from_str(r#"host = "127.0.0.1""#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = load_config_from_str("not valid toml {{{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
