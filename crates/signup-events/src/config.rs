//! Kafka and Keycloak connection configuration.

use crate::error::EventError;
use secrecy::SecretString;
use std::env;
use std::str::FromStr;

/// Default topic that user-created envelopes are published to.
pub const DEFAULT_USER_CREATED_TOPIC: &str = "keycloak-user-created";

/// Security protocol for Kafka connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityProtocol {
    /// Plaintext connection (no encryption or auth).
    Plaintext,
    /// SSL encryption without SASL auth.
    Ssl,
    /// SASL authentication without encryption.
    SaslPlaintext,
    /// SASL authentication with SSL encryption.
    SaslSsl,
}

impl FromStr for SecurityProtocol {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAINTEXT" => Ok(Self::Plaintext),
            "SSL" => Ok(Self::Ssl),
            "SASL_PLAINTEXT" => Ok(Self::SaslPlaintext),
            "SASL_SSL" => Ok(Self::SaslSsl),
            _ => Err(EventError::ConfigInvalid {
                var: "KAFKA_SECURITY_PROTOCOL".to_string(),
                reason: format!("Unknown protocol: {s}"),
            }),
        }
    }
}

impl SecurityProtocol {
    /// Convert to rdkafka string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }

    fn requires_sasl(&self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

/// SASL mechanism for authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl FromStr for SaslMechanism {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM_SHA_256" => Ok(Self::ScramSha256),
            "SCRAM_SHA_512" => Ok(Self::ScramSha512),
            _ => Err(EventError::ConfigInvalid {
                var: "KAFKA_SASL_MECHANISM".to_string(),
                reason: format!("Unknown mechanism: {s}"),
            }),
        }
    }
}

impl SaslMechanism {
    /// Convert to rdkafka string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL credentials for authentication.
#[derive(Debug, Clone)]
pub struct SaslCredentials {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: SecretString,
}

/// Kafka connection configuration.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated list of broker addresses.
    pub bootstrap_servers: String,
    /// Security protocol.
    pub security_protocol: SecurityProtocol,
    /// SASL credentials (required if using SASL).
    pub sasl: Option<SaslCredentials>,
    /// Client identifier.
    pub client_id: String,
    /// Topic that user-created envelopes are published to.
    pub user_created_topic: String,
}

impl KafkaConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `KAFKA_BOOTSTRAP_SERVERS`: Comma-separated broker list
    ///
    /// Optional:
    /// - `KAFKA_SECURITY_PROTOCOL`: PLAINTEXT (default), SSL, `SASL_PLAINTEXT`, `SASL_SSL`
    /// - `KAFKA_CLIENT_ID`: Client identifier (default: "signup-relay")
    /// - `KAFKA_USER_CREATED_TOPIC`: Target topic (default: "keycloak-user-created")
    /// - `KAFKA_SASL_MECHANISM`, `KAFKA_SASL_USERNAME`, `KAFKA_SASL_PASSWORD` (required if SASL)
    pub fn from_env() -> Result<Self, EventError> {
        let bootstrap_servers = require_var("KAFKA_BOOTSTRAP_SERVERS")?;

        let security_protocol = match env::var("KAFKA_SECURITY_PROTOCOL") {
            Ok(v) => SecurityProtocol::from_str(&v)?,
            Err(_) => SecurityProtocol::Plaintext,
        };

        let client_id = env::var("KAFKA_CLIENT_ID").unwrap_or_else(|_| "signup-relay".to_string());

        let user_created_topic = env::var("KAFKA_USER_CREATED_TOPIC")
            .unwrap_or_else(|_| DEFAULT_USER_CREATED_TOPIC.to_string());

        let sasl = if security_protocol.requires_sasl() {
            let mechanism_str = require_var("KAFKA_SASL_MECHANISM")?;
            let username = require_var("KAFKA_SASL_USERNAME")?;
            let password = require_var("KAFKA_SASL_PASSWORD")?;

            Some(SaslCredentials {
                mechanism: SaslMechanism::from_str(&mechanism_str)?,
                username,
                password: SecretString::from(password),
            })
        } else {
            None
        };

        let mut builder = Self::builder()
            .bootstrap_servers(bootstrap_servers)
            .security_protocol(security_protocol)
            .client_id(client_id)
            .user_created_topic(user_created_topic);
        if let Some(sasl) = sasl {
            builder = builder.sasl(sasl.mechanism, sasl.username, sasl.password);
        }
        builder.build()
    }

    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> KafkaConfigBuilder {
        KafkaConfigBuilder::new()
    }
}

/// Builder for `KafkaConfig`.
#[derive(Debug, Default)]
pub struct KafkaConfigBuilder {
    bootstrap_servers: Option<String>,
    security_protocol: Option<SecurityProtocol>,
    sasl: Option<SaslCredentials>,
    client_id: Option<String>,
    user_created_topic: Option<String>,
}

impl KafkaConfigBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bootstrap servers.
    pub fn bootstrap_servers(mut self, servers: impl Into<String>) -> Self {
        self.bootstrap_servers = Some(servers.into());
        self
    }

    /// Set security protocol.
    #[must_use]
    pub fn security_protocol(mut self, protocol: SecurityProtocol) -> Self {
        self.security_protocol = Some(protocol);
        self
    }

    /// Set SASL credentials.
    #[must_use]
    pub fn sasl(
        mut self,
        mechanism: SaslMechanism,
        username: String,
        password: SecretString,
    ) -> Self {
        self.sasl = Some(SaslCredentials {
            mechanism,
            username,
            password,
        });
        self
    }

    /// Set client ID.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set the topic user-created envelopes are published to.
    pub fn user_created_topic(mut self, topic: impl Into<String>) -> Self {
        self.user_created_topic = Some(topic.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<KafkaConfig, EventError> {
        let bootstrap_servers = self.bootstrap_servers.ok_or(EventError::ConfigMissing {
            var: "bootstrap_servers".to_string(),
        })?;

        let security_protocol = self
            .security_protocol
            .unwrap_or(SecurityProtocol::Plaintext);

        if security_protocol.requires_sasl() && self.sasl.is_none() {
            return Err(EventError::ConfigMissing {
                var: "sasl_credentials".to_string(),
            });
        }

        let user_created_topic = self
            .user_created_topic
            .unwrap_or_else(|| DEFAULT_USER_CREATED_TOPIC.to_string());
        if user_created_topic.trim().is_empty() {
            return Err(EventError::ConfigInvalid {
                var: "user_created_topic".to_string(),
                reason: "topic must not be empty".to_string(),
            });
        }

        Ok(KafkaConfig {
            bootstrap_servers,
            security_protocol,
            sasl: self.sasl,
            client_id: self.client_id.unwrap_or_else(|| "signup-relay".to_string()),
            user_created_topic,
        })
    }
}

/// Keycloak admin API configuration used to resolve users by id.
#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server, e.g. `http://keycloak:8080`.
    pub base_url: String,
    /// Realm the admin client authenticates against.
    pub admin_realm: String,
    /// Service-account client id.
    pub client_id: String,
    /// Service-account client secret.
    pub client_secret: SecretString,
}

impl KeycloakConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `KEYCLOAK_URL`, `KEYCLOAK_CLIENT_ID`, `KEYCLOAK_CLIENT_SECRET`.
    /// Optional: `KEYCLOAK_ADMIN_REALM` (default: "master").
    pub fn from_env() -> Result<Self, EventError> {
        let base_url = require_var("KEYCLOAK_URL")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(EventError::ConfigInvalid {
                var: "KEYCLOAK_URL".to_string(),
                reason: format!("expected an http(s) URL, got {base_url}"),
            });
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_realm: env::var("KEYCLOAK_ADMIN_REALM").unwrap_or_else(|_| "master".to_string()),
            client_id: require_var("KEYCLOAK_CLIENT_ID")?,
            client_secret: SecretString::from(require_var("KEYCLOAK_CLIENT_SECRET")?),
        })
    }
}

fn require_var(var: &str) -> Result<String, EventError> {
    env::var(var).map_err(|_| EventError::ConfigMissing {
        var: var.to_string(),
    })
}
