//! Process-wide publisher for user-created envelopes.
//!
//! [`Publisher`] owns the broker connection and the target topic.
//! [`SharedPublisher`] is the handle every listener clones: it creates the
//! publisher lazily on first use, exactly once, and releases it exactly once
//! at process teardown.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::envelope::UserCreatedEnvelope;
use crate::error::EventError;
use crate::health::HealthStatus;

/// Broker acknowledgement for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Minimal capability the publisher needs from a message broker client.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Send one keyed message and wait for the broker acknowledgement.
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, EventError>;

    /// Probe connectivity and whether `topic` exists.
    async fn health_check(&self, topic: &str) -> Result<HealthStatus, EventError>;

    /// Flush pending messages and release the connection.
    async fn close(&self) -> Result<(), EventError>;
}

/// Publishes envelopes to a single topic fixed at construction.
pub struct Publisher {
    broker: Arc<dyn BrokerClient>,
    topic: String,
    closed: AtomicBool,
}

impl Publisher {
    pub fn new(broker: Arc<dyn BrokerClient>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Topic envelopes are published to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Serialize and send an envelope, keyed by its user id.
    #[instrument(skip(self, envelope), fields(
        topic = %self.topic,
        keycloak_id = %envelope.keycloak_id(),
        correlation_id = %envelope.correlation_id()
    ))]
    pub async fn publish(
        &self,
        envelope: &UserCreatedEnvelope,
    ) -> Result<DeliveryReceipt, EventError> {
        if self.is_closed() {
            return Err(EventError::PublisherClosed);
        }

        let key = envelope.partition_key();
        let payload = envelope.to_json_bytes()?;

        debug!(key = %key, payload_size = payload.len(), "Publishing user created event");

        let receipt = self.broker.send(&self.topic, key, &payload).await?;

        debug!(
            partition = receipt.partition,
            offset = receipt.offset,
            "User created event delivered"
        );

        Ok(receipt)
    }

    /// Check the broker connection.
    pub async fn health_check(&self) -> Result<HealthStatus, EventError> {
        if self.is_closed() {
            return Ok(HealthStatus::disconnected());
        }
        self.broker.health_check(&self.topic).await
    }

    /// Release the broker connection. Only the first call reaches the broker.
    pub async fn shutdown(&self) -> Result<(), EventError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(topic = %self.topic, "Publisher already shut down");
            return Ok(());
        }

        info!(topic = %self.topic, "Shutting down publisher");
        self.broker.close().await
    }
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Publisher, EventError>> + Send>>;
type ConnectFn = Box<dyn Fn() -> ConnectFuture + Send + Sync>;

struct SharedInner {
    cell: OnceCell<Arc<Publisher>>,
    connect: Option<ConnectFn>,
    closed: AtomicBool,
}

/// Cloneable handle to the one publisher of this process.
#[derive(Clone)]
pub struct SharedPublisher {
    inner: Arc<SharedInner>,
}

impl SharedPublisher {
    /// Create a handle whose publisher is built by `connect` on first use.
    ///
    /// Concurrent first callers wait on a single `connect` call. If it fails,
    /// the next caller tries again.
    pub fn lazy<F, Fut>(connect: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Publisher, EventError>> + Send + 'static,
    {
        let connect: ConnectFn = Box::new(move || Box::pin(connect()));
        Self {
            inner: Arc::new(SharedInner {
                cell: OnceCell::new(),
                connect: Some(connect),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Wrap an already constructed publisher.
    pub fn new(publisher: Publisher) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                cell: OnceCell::new_with(Some(Arc::new(publisher))),
                connect: None,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the publisher, connecting if this is the first use.
    ///
    /// A connect that completes after [`shutdown`](Self::shutdown) releases
    /// its own publisher instead of handing it out.
    pub async fn get(&self) -> Result<Arc<Publisher>, EventError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EventError::PublisherClosed);
        }

        let publisher = match &self.inner.connect {
            Some(connect) => self
                .inner
                .cell
                .get_or_try_init(|| async {
                    let publisher = connect().await?;
                    info!(topic = %publisher.topic(), "Publisher initialized");
                    Ok::<_, EventError>(Arc::new(publisher))
                })
                .await
                .cloned()?,
            None => self
                .inner
                .cell
                .get()
                .cloned()
                .ok_or(EventError::PublisherClosed)?,
        };

        if self.inner.closed.load(Ordering::SeqCst) {
            publisher.shutdown().await?;
            return Err(EventError::PublisherClosed);
        }
        Ok(publisher)
    }

    /// The publisher, if it has been created.
    pub fn get_if_initialized(&self) -> Option<Arc<Publisher>> {
        self.inner.cell.get().cloned()
    }

    /// Publish through the shared publisher, connecting first if needed.
    pub async fn publish(
        &self,
        envelope: &UserCreatedEnvelope,
    ) -> Result<DeliveryReceipt, EventError> {
        self.get().await?.publish(envelope).await
    }

    /// Shut the publisher down and refuse further use.
    ///
    /// A publisher that was never created is not created just to be closed.
    pub async fn shutdown(&self) -> Result<(), EventError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        match self.inner.cell.get() {
            Some(publisher) => publisher.shutdown().await,
            None => Ok(()),
        }
    }
}
