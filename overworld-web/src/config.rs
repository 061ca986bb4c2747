use overworld_core::{ConfigError, SessionConfig};
use serde::{Deserialize, Serialize};

/// Host settings passed from the page when the client is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// URL of the compiled engine module.
    #[serde(default = "ClientConfig::default_engine_url")]
    pub engine_url: String,
    /// Base path of the remote endpoint routes.
    #[serde(default = "ClientConfig::default_api_base")]
    pub api_base: String,
    #[serde(default = "ClientConfig::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub session: SessionConfig,
}

impl ClientConfig {
    fn default_engine_url() -> String {
        "/wasm/main.wasm".to_string()
    }

    fn default_api_base() -> String {
        "/api".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// # Errors
    ///
    /// Returns an error if the embedded session config is out of range.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine_url: Self::default_engine_url(),
            api_base: Self::default_api_base(),
            log_level: Self::default_log_level(),
            session: SessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_bundled_paths() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.engine_url, "/wasm/main.wasm");
        assert_eq!(config.api_base, "/api");
    }

    #[test]
    fn nested_session_values_are_validated() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"apiBase": "/proxy/api", "session": {"desyncCeiling": 0}}"#)
                .unwrap();
        assert_eq!(config.api_base, "/proxy/api");
        assert_eq!(config.validate(), Err(ConfigError::DesyncCeiling(0)));
    }
}
