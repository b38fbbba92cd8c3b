use std::collections::HashMap;
use std::env;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_STREAM_BUFFER: &str = "256";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// Change notices buffered per stream subscriber before it lags
    pub stream_buffer: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            stream_buffer: 256,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "JOT_API_BIND_ADDR", DEFAULT_BIND_ADDR);
        if !bind_addr.contains(':') {
            return Err(ConfigError::Invalid(
                "JOT_API_BIND_ADDR must be host:port".to_string(),
            ));
        }

        let stream_buffer = value_or_default(&lookup, "JOT_API_STREAM_BUFFER", DEFAULT_STREAM_BUFFER)
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "JOT_API_STREAM_BUFFER must be an integer in [16, 4096]".to_string(),
                )
            })?;
        if !(16..=4_096).contains(&stream_buffer) {
            return Err(ConfigError::Invalid(
                "JOT_API_STREAM_BUFFER must be in [16, 4096]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            stream_buffer,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        ApiConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_defaults() {
        assert_eq!(config_from(&[]).unwrap(), ApiConfig::default());
    }

    #[test]
    fn config_rejects_out_of_range_buffer() {
        let err = config_from(&[("JOT_API_STREAM_BUFFER", "4")]).unwrap_err();
        assert!(err.to_string().contains("JOT_API_STREAM_BUFFER"));

        let err = config_from(&[("JOT_API_STREAM_BUFFER", "lots")]).unwrap_err();
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn config_reads_bind_addr() {
        let config = config_from(&[("JOT_API_BIND_ADDR", " 0.0.0.0:8080 ")]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config_from(&[("JOT_API_BIND_ADDR", "localhost")]).is_err());
    }
}
