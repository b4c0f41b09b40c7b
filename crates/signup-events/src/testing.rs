//! In-memory implementations of the broker and directory seams.
//!
//! Used by this crate's tests and by embedders that want to exercise a
//! listener without Kafka or Keycloak.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::EventError;
use crate::health::HealthStatus;
use crate::identity::{UserDirectory, UserRecord};
use crate::publisher::{BrokerClient, DeliveryReceipt};

/// A message captured by [`InMemoryBroker`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Broker that records every send instead of talking to Kafka.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    sent: Mutex<Vec<SentMessage>>,
    failure: Mutex<Option<String>>,
    attempts: AtomicUsize,
    closes: AtomicUsize,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail with `cause`.
    pub fn fail_with(&self, cause: impl Into<String>) {
        *self.failure.lock().expect("lock poisoned") = Some(cause.into());
    }

    /// Let sends succeed again.
    pub fn recover(&self) {
        *self.failure.lock().expect("lock poisoned") = None;
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    /// Number of send calls, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, EventError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(cause) = self.failure.lock().expect("lock poisoned").clone() {
            return Err(EventError::PublishFailed {
                topic: topic.to_string(),
                cause,
            });
        }

        let mut sent = self.sent.lock().expect("lock poisoned");
        sent.push(SentMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        });

        Ok(DeliveryReceipt {
            topic: topic.to_string(),
            partition: 0,
            offset: (sent.len() - 1) as i64,
        })
    }

    async fn health_check(&self, topic: &str) -> Result<HealthStatus, EventError> {
        let failing = self.failure.lock().expect("lock poisoned").is_some();
        let topic_available = self
            .sent
            .lock()
            .expect("lock poisoned")
            .iter()
            .any(|m| m.topic == topic);

        Ok(HealthStatus {
            connected: !failing,
            brokers: usize::from(!failing),
            topic_available,
        })
    }

    async fn close(&self) -> Result<(), EventError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Plain user record built in code.
#[derive(Debug, Clone, Default)]
pub struct StaticUser {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub attributes: HashMap<String, Vec<String>>,
}

impl StaticUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    #[must_use]
    pub fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = verified;
        self
    }

    #[must_use]
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

impl UserRecord for StaticUser {
    fn id(&self) -> &str {
        &self.id
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    fn email_verified(&self) -> bool {
        self.email_verified
    }

    fn attribute_values(&self, name: &str) -> Vec<String> {
        self.attributes.get(name).cloned().unwrap_or_default()
    }
}

/// Directory backed by a map of `(realm, user id)` to user.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: Mutex<HashMap<(String, String), StaticUser>>,
    failure: Mutex<Option<String>>,
    lookups: AtomicUsize,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user in `realm`.
    pub fn insert(&self, realm: impl Into<String>, user: StaticUser) {
        self.users
            .lock()
            .expect("lock poisoned")
            .insert((realm.into(), user.id.clone()), user);
    }

    /// Remove a user, simulating deletion racing the event.
    pub fn remove(&self, realm: &str, user_id: &str) {
        self.users
            .lock()
            .expect("lock poisoned")
            .remove(&(realm.to_string(), user_id.to_string()));
    }

    /// Make every following lookup fail with `cause`.
    pub fn fail_with(&self, cause: impl Into<String>) {
        *self.failure.lock().expect("lock poisoned") = Some(cause.into());
    }

    /// Number of lookups performed.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Convenience for sharing as a trait object.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_user(
        &self,
        realm: &str,
        user_id: &str,
    ) -> Result<Option<Box<dyn UserRecord>>, EventError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(cause) = self.failure.lock().expect("lock poisoned").clone() {
            return Err(EventError::DirectoryFailed {
                realm: realm.to_string(),
                user_id: user_id.to_string(),
                cause,
            });
        }

        Ok(self
            .users
            .lock()
            .expect("lock poisoned")
            .get(&(realm.to_string(), user_id.to_string()))
            .cloned()
            .map(|user| Box::new(user) as Box<dyn UserRecord>))
    }
}
