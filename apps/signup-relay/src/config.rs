//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: a missing or malformed required variable stops the
//! process before any connection is attempted.

use std::env;
use secrecy::SecretString;
use thiserror::Error;

use signup_events::{EventError, KafkaConfig, KeycloakConfig};

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

impl From<EventError> for ConfigError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::ConfigMissing { var } => Self::MissingVar(var),
            EventError::ConfigInvalid { var, reason } => Self::InvalidValue {
                var,
                message: reason,
            },
            other => Self::InvalidValue {
                var: "configuration".to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind the inbound HTTP listener on.
    pub host: String,
    pub port: u16,
    /// Default log filter, overridden by `RUST_LOG`.
    pub rust_log: String,
    /// Bearer token the identity provider presents on the event routes.
    pub event_token: SecretString,
    pub kafka: KafkaConfig,
    pub keycloak: KeycloakConfig,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Optional: `HOST` (default "0.0.0.0"), `PORT` (default 8080),
    /// `RUST_LOG` (default "info,signup_events=debug").
    /// Required: `RELAY_EVENT_TOKEN`.
    /// Kafka and Keycloak variables are documented on their own configs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>()?,
            Err(_) => 8080,
        };
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }

        let event_token = env::var("RELAY_EVENT_TOKEN")
            .map_err(|_| ConfigError::MissingVar("RELAY_EVENT_TOKEN".to_string()))?;
        if event_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "RELAY_EVENT_TOKEN".to_string(),
                message: "token must not be blank".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            rust_log: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,signup_events=debug".to_string()),
            event_token: SecretString::from(event_token),
            kafka: KafkaConfig::from_env()?,
            keycloak: KeycloakConfig::from_env()?,
        })
    }

    /// Address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_config_errors_map_to_config_errors() {
        let missing: ConfigError = EventError::ConfigMissing {
            var: "KAFKA_BOOTSTRAP_SERVERS".to_string(),
        }
        .into();
        assert_eq!(
            missing.to_string(),
            "Missing required environment variable: KAFKA_BOOTSTRAP_SERVERS"
        );

        let invalid: ConfigError = EventError::ConfigInvalid {
            var: "KAFKA_SECURITY_PROTOCOL".to_string(),
            reason: "Unknown protocol: TLS".to_string(),
        }
        .into();
        assert!(matches!(invalid, ConfigError::InvalidValue { ref var, .. } if var == "KAFKA_SECURITY_PROTOCOL"));
    }

    #[test]
    fn test_invalid_port_display() {
        let err: ConfigError = "http".parse::<u16>().unwrap_err().into();
        assert!(err.to_string().starts_with("Failed to parse port"));
    }
}
