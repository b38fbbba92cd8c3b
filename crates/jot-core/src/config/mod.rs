//! Client configuration.
//!
//! Resolved from the environment through an injectable lookup so callers
//! (and tests) can supply values from anywhere. Command-line overrides are
//! applied by the front ends after loading.

use std::collections::HashMap;
use std::env;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 0;
const DEFAULT_STREAM_RETRY_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the remote service; `None` keeps the client local-only
    pub api_url: Option<String>,
    pub db_path: PathBuf,
    /// Bound on every REST call to the remote
    pub request_timeout: Duration,
    /// Periodic sync interval; `None` disables the timer
    pub sync_interval: Option<Duration>,
    /// Delay before reconnecting a dropped change stream
    pub stream_retry: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = optional_trimmed(&lookup, "JOT_API_URL")
            .map(|url| validate_api_url(&url))
            .transpose()?;

        let db_path = match optional_trimmed(&lookup, "JOT_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let request_timeout_secs = bounded_secs(
            &lookup,
            "JOT_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
            1..=120,
        )?;
        let sync_interval_secs = bounded_secs(
            &lookup,
            "JOT_SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL_SECS,
            0..=86_400,
        )?;
        let stream_retry_secs = bounded_secs(
            &lookup,
            "JOT_STREAM_RETRY_SECS",
            DEFAULT_STREAM_RETRY_SECS,
            1..=600,
        )?;

        Ok(Self {
            api_url,
            db_path,
            request_timeout: Duration::from_secs(request_timeout_secs),
            sync_interval: (sync_interval_secs > 0)
                .then(|| Duration::from_secs(sync_interval_secs)),
            stream_retry: Duration::from_secs(stream_retry_secs),
        })
    }

    /// Replace the API URL, validating it the same way as the environment value
    pub fn with_api_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.api_url = Some(validate_api_url(url)?);
        Ok(self)
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Drop the API URL, keeping the client local-only
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.api_url = None;
        self
    }
}

/// `<data dir>/jot/jot.db`
pub fn default_db_path() -> Result<PathBuf, ConfigError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("jot").join("jot.db"))
        .ok_or(ConfigError::MissingVar("JOT_DB_PATH"))
}

fn validate_api_url(raw: &str) -> Result<String, ConfigError> {
    let url = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| ConfigError::Invalid("JOT_API_URL must not be empty".to_string()))?;
    if !is_http_url(&url) {
        return Err(ConfigError::Invalid(
            "JOT_API_URL must start with http:// or https://".to_string(),
        ));
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn bounded_secs(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        ClientConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[("JOT_DB_PATH", "/tmp/jot.db")]).unwrap();
        assert_eq!(
            config,
            ClientConfig {
                api_url: None,
                db_path: PathBuf::from("/tmp/jot.db"),
                request_timeout: Duration::from_secs(10),
                sync_interval: None,
                stream_retry: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn api_url_is_trimmed_and_validated() {
        let config = config_from(&[
            ("JOT_DB_PATH", "/tmp/jot.db"),
            ("JOT_API_URL", " http://localhost:3000/ "),
        ])
        .unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:3000"));

        let error = config_from(&[("JOT_DB_PATH", "/tmp/jot.db"), ("JOT_API_URL", "localhost")])
            .unwrap_err();
        assert!(error.to_string().contains("JOT_API_URL"));
    }

    #[test]
    fn numeric_values_are_bounded() {
        let error = config_from(&[
            ("JOT_DB_PATH", "/tmp/jot.db"),
            ("JOT_REQUEST_TIMEOUT_SECS", "0"),
        ])
        .unwrap_err();
        assert!(error.to_string().contains("JOT_REQUEST_TIMEOUT_SECS"));

        let error = config_from(&[
            ("JOT_DB_PATH", "/tmp/jot.db"),
            ("JOT_STREAM_RETRY_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(error.to_string().contains("integer"));

        let config = config_from(&[
            ("JOT_DB_PATH", "/tmp/jot.db"),
            ("JOT_SYNC_INTERVAL_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.sync_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn overrides_replace_environment_values() {
        let config = config_from(&[
            ("JOT_DB_PATH", "/tmp/jot.db"),
            ("JOT_API_URL", "http://a.example"),
        ])
        .unwrap()
        .with_db_path("/tmp/other.db")
        .with_api_url("https://b.example/")
        .unwrap();
        assert_eq!(config.api_url.as_deref(), Some("https://b.example"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.offline().api_url, None);
    }
}
