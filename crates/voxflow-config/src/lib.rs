//! Process settings
//!
//! Layered from an optional config file plus `VOXFLOW_`-prefixed environment
//! variables (`VOXFLOW_SERVER__PORT=9090`). Validated once at startup; a
//! configuration error aborts the process with a distinguishable error.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Optional path to a JSON file of assistant definitions loaded at boot
    #[serde(default)]
    pub assistants_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public host the telephony answer documents point carriers at
    pub media_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            media_host: "localhost:8080".to_string(),
        }
    }
}

/// One remote speech endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechEndpoint {
    pub endpoint: String,
    pub api_key: String,
}

/// Chat-completion endpoint for the request/response executor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionEndpoint {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub stt: Option<SpeechEndpoint>,
    #[serde(default)]
    pub tts: Option<SpeechEndpoint>,
    #[serde(default)]
    pub completion: Option<CompletionEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

impl Settings {
    /// Load from an optional file plus the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("VOXFLOW").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if let Some(stt) = &self.providers.stt {
            if stt.endpoint.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "providers.stt.endpoint".to_string(),
                    message: "endpoint must not be empty".to_string(),
                });
            }
        }
        if let Some(tts) = &self.providers.tts {
            if tts.endpoint.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "providers.tts.endpoint".to_string(),
                    message: "endpoint must not be empty".to_string(),
                });
            }
        }
        if let Some(completion) = &self.providers.completion {
            if completion.model.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "providers.completion.model".to_string(),
                    message: "model must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.observability.log_level, "info");
    }

    #[test]
    fn test_empty_provider_endpoint_rejected() {
        let settings = Settings {
            providers: ProvidersConfig {
                stt: Some(SpeechEndpoint::default()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "providers.stt.endpoint"
        ));
    }

    #[test]
    fn test_completion_requires_model() {
        let settings = Settings {
            providers: ProvidersConfig {
                completion: Some(CompletionEndpoint {
                    endpoint: "https://llm.example.com".into(),
                    api_key: "k".into(),
                    model: String::new(),
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
