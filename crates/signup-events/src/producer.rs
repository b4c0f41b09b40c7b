//! Kafka broker client.

use crate::config::KafkaConfig;
use crate::error::EventError;
use crate::health::HealthStatus;
use crate::publisher::{BrokerClient, DeliveryReceipt, Publisher};

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

const SEND_QUEUE_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Kafka producer behind the [`BrokerClient`] seam.
pub struct KafkaBroker {
    producer: FutureProducer,
    bootstrap_servers: String,
}

impl KafkaBroker {
    /// Create a producer for the given configuration.
    ///
    /// The client connects lazily; this fails only on invalid settings.
    pub fn new(config: &KafkaConfig) -> Result<Self, EventError> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("security.protocol", config.security_protocol.as_str())
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("enable.idempotence", "true");

        if let Some(sasl) = &config.sasl {
            client_config
                .set("sasl.mechanism", sasl.mechanism.as_str())
                .set("sasl.username", &sasl.username)
                .set("sasl.password", sasl.password.expose_secret());
        }

        let producer: FutureProducer = client_config.create().map_err(|e| {
            EventError::ConnectionFailed {
                broker: config.bootstrap_servers.clone(),
                cause: e.to_string(),
            }
        })?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            client_id = %config.client_id,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            bootstrap_servers: config.bootstrap_servers.clone(),
        })
    }

    /// Build a [`Publisher`] over a new Kafka producer for the configured topic.
    pub fn connect(config: &KafkaConfig) -> Result<Publisher, EventError> {
        let broker = Arc::new(Self::new(config)?);
        Ok(Publisher::new(broker, config.user_created_topic.clone()))
    }
}

/// A blocking client call that panicked or was cancelled.
fn blocking_task_failed(broker: &str, err: &JoinError) -> EventError {
    EventError::ConnectionFailed {
        broker: broker.to_string(),
        cause: format!("Blocking Kafka call failed: {err}"),
    }
}

#[async_trait]
impl BrokerClient for KafkaBroker {
    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, EventError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(SEND_QUEUE_TIMEOUT))
            .await
            .map_err(|(err, _)| EventError::PublishFailed {
                topic: topic.to_string(),
                cause: err.to_string(),
            })?;

        debug!(partition, offset, "Kafka delivery acknowledged");

        Ok(DeliveryReceipt {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }

    async fn health_check(&self, topic: &str) -> Result<HealthStatus, EventError> {
        let producer = self.producer.clone();
        let topic = topic.to_string();
        let broker = self.bootstrap_servers.clone();

        // fetch_metadata blocks the calling thread
        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(topic.as_str()), METADATA_TIMEOUT)
                .map(|metadata| {
                    let topic_available = metadata
                        .topics()
                        .iter()
                        .any(|t| t.name() == topic && t.error().is_none());
                    (metadata.brokers().len(), topic_available)
                })
        })
        .await
        .map_err(|e| blocking_task_failed(&broker, &e))?
        .map_err(|e| EventError::ConnectionFailed {
            broker,
            cause: e.to_string(),
        })?;

        Ok(HealthStatus {
            connected: true,
            brokers: metadata.0,
            topic_available: metadata.1,
        })
    }

    async fn close(&self) -> Result<(), EventError> {
        let producer = self.producer.clone();

        let flushed = tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
            .await
            .map_err(|e| blocking_task_failed(&self.bootstrap_servers, &e))?;

        match flushed {
            Ok(()) => {
                info!(bootstrap_servers = %self.bootstrap_servers, "Kafka producer flushed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Kafka producer flush incomplete");
                Err(EventError::Kafka(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_creation_is_lazy() {
        let config = KafkaConfig::builder()
            .bootstrap_servers("localhost:9092")
            .client_id("test")
            .build()
            .unwrap();

        // No broker is running; creating the client must still succeed.
        let publisher = KafkaBroker::connect(&config).unwrap();
        assert_eq!(publisher.topic(), "keycloak-user-created");
    }

    #[tokio::test]
    async fn test_panicked_blocking_call_is_connection_failure() {
        let join_error = tokio::task::spawn_blocking(|| panic!("metadata call panicked"))
            .await
            .unwrap_err();

        let err = blocking_task_failed("localhost:9092", &join_error);

        assert!(matches!(
            err,
            EventError::ConnectionFailed { ref broker, .. } if broker == "localhost:9092"
        ));
        assert!(err.is_transient());
    }
}
