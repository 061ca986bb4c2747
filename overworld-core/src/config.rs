//! Session tuning knobs.
use crate::shadow::{DEFAULT_DESYNC_CEILING, ENGINE_SEARCH_LIMIT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("desync ceiling must be in 1..={ENGINE_SEARCH_LIMIT} (got {0})")]
    DesyncCeiling(u64),
    #[error("poll interval must be at least 1 ms")]
    PollInterval,
    #[error("connect timeout must be at least 1 ms")]
    ConnectTimeout,
    #[error("invalid session config JSON: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Delay between poll iterations.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Step distance at which the shadow RNG is reseeded.
    #[serde(default = "default_desync_ceiling")]
    pub desync_ceiling: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

const fn default_poll_interval_ms() -> u64 {
    50
}

const fn default_desync_ceiling() -> u64 {
    DEFAULT_DESYNC_CEILING
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            desync_ceiling: default_desync_ceiling(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first out-of-range value.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.desync_ceiling == 0 || self.desync_ceiling > ENGINE_SEARCH_LIMIT {
            return Err(ConfigError::DesyncCeiling(self.desync_ceiling));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ConnectTimeout);
        }
        Ok(())
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.desync_ceiling, 1_000_000);
    }

    #[test]
    fn partial_json_overrides_named_fields() {
        let config = SessionConfig::from_json(r#"{"desyncCeiling": 500}"#).unwrap();
        assert_eq!(config.desync_ceiling, 500);
        assert_eq!(config.poll_interval_ms, 50);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert_eq!(
            SessionConfig::from_json(r#"{"desyncCeiling": 0}"#),
            Err(ConfigError::DesyncCeiling(0))
        );
        assert_eq!(
            SessionConfig::from_json(r#"{"desyncCeiling": 1000001}"#),
            Err(ConfigError::DesyncCeiling(1_000_001))
        );
        assert_eq!(
            SessionConfig::from_json(r#"{"pollIntervalMs": 0}"#),
            Err(ConfigError::PollInterval)
        );
        assert!(matches!(
            SessionConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
