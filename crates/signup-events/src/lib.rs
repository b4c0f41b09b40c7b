//! # signup-events
//!
//! Relays Keycloak self-registration events to Kafka.
//!
//! A [`UserRegistrationListener`] receives identity-provider lifecycle
//! events, resolves the registered user through a [`UserDirectory`], builds a
//! [`UserCreatedEnvelope`] and hands it to the process-wide
//! [`SharedPublisher`]. Publishing is best-effort: every failure is logged and
//! reported as a [`ListenerOutcome`], never propagated to the event source.
//!
//! ## Cargo Features
//!
//! - `kafka`: Enable the Kafka broker client (requires librdkafka)
//! - `kafka-static`: Build librdkafka from source (requires cmake)
//! - `test-utils`: Expose the in-memory doubles in the `testing` module
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use signup_events::{
//!     KafkaBroker, KafkaConfig, KeycloakConfig, KeycloakDirectory, LifecycleEvent,
//!     SharedPublisher, UserRegistrationListener,
//! };
//!
//! let kafka = KafkaConfig::from_env()?;
//! let publisher = SharedPublisher::lazy(move || {
//!     let kafka = kafka.clone();
//!     async move { KafkaBroker::connect(&kafka) }
//! });
//! let directory = Arc::new(KeycloakDirectory::new(KeycloakConfig::from_env()?)?);
//! let listener = UserRegistrationListener::new(directory, publisher.clone());
//!
//! listener.on_event(&LifecycleEvent::register("acme", user_id)).await;
//! publisher.shutdown().await?;
//! ```

pub mod config;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod extractor;
pub mod health;
pub mod identity;
pub mod listener;
pub mod publisher;

// In-memory doubles (require `test-utils` feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Kafka-dependent modules (require `kafka` feature)
#[cfg(feature = "kafka")]
pub mod producer;

pub use config::{KafkaConfig, KafkaConfigBuilder, KeycloakConfig};
pub use directory::{KeycloakDirectory, KeycloakUser};
pub use envelope::{UserCreatedEnvelope, UserSnapshot};
pub use error::EventError;
pub use extractor::{extract_attributes, ALLOWED_ATTRIBUTES};
pub use health::HealthStatus;
pub use identity::{AdminEvent, EventType, LifecycleEvent, UserDirectory, UserRecord};
pub use listener::{FailureStage, ListenerOutcome, UserRegistrationListener};
pub use publisher::{BrokerClient, DeliveryReceipt, Publisher, SharedPublisher};

#[cfg(feature = "kafka")]
pub use producer::KafkaBroker;
