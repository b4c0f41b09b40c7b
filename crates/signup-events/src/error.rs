//! Error types for the signup-events crate.

use thiserror::Error;

/// Errors that can occur while capturing or publishing registration events.
#[derive(Debug, Error)]
pub enum EventError {
    // Configuration errors (permanent, no retry)
    /// Required configuration variable is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    // Connection errors (transient)
    /// Failed to connect to Kafka broker.
    #[error("Connection to broker {broker} failed: {cause}")]
    ConnectionFailed { broker: String, cause: String },

    /// Connection timed out.
    #[error("Connection timed out")]
    ConnectionTimeout,

    // Publishing errors
    /// Failed to publish envelope to topic.
    #[error("Failed to publish to topic {topic}: {cause}")]
    PublishFailed { topic: String, cause: String },

    /// Failed to serialize envelope.
    #[error("Failed to serialize envelope for user {user_id}: {cause}")]
    SerializationFailed { user_id: String, cause: String },

    /// The publisher was already shut down.
    #[error("Publisher is closed")]
    PublisherClosed,

    // Envelope errors
    /// Envelope could not be built from the user record.
    #[error("Invalid event envelope: {reason}")]
    InvalidEnvelope { reason: String },

    // User directory errors
    /// User lookup against the identity provider failed.
    #[error("User lookup failed for {user_id} in realm {realm}: {cause}")]
    DirectoryFailed {
        realm: String,
        user_id: String,
        cause: String,
    },

    /// Could not obtain an admin access token from the identity provider.
    #[error("Directory authentication failed: {cause}")]
    DirectoryAuth { cause: String },

    // Internal Kafka errors
    /// Internal Kafka client error.
    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl EventError {
    /// Returns true if this error is transient and could succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventError::ConnectionFailed { .. }
                | EventError::ConnectionTimeout
                | EventError::PublishFailed { .. }
                | EventError::DirectoryFailed { .. }
                | EventError::DirectoryAuth { .. }
        )
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EventError::ConfigMissing { .. } | EventError::ConfigInvalid { .. }
        )
    }
}
