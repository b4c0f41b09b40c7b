//! Entry point for identity-provider lifecycle events.
//!
//! A listener turns a self-registration event into one published
//! [`UserCreatedEnvelope`]. It is cheap to clone and holds no per-event
//! state, so the host may create one per callback or share one across
//! threads. Failures are logged and reported in the returned
//! [`ListenerOutcome`]; they never propagate to the caller.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::envelope::UserCreatedEnvelope;
use crate::error::EventError;
use crate::identity::{AdminEvent, EventType, LifecycleEvent, UserDirectory};
use crate::publisher::{DeliveryReceipt, SharedPublisher};

/// Step at which handling of an event gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Lookup,
    Build,
    Publish,
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// Not an event this listener handles.
    Ignored,
    /// The user no longer exists; nothing was published.
    UserNotFound,
    /// The envelope reached the broker.
    Published(DeliveryReceipt),
    /// Handling stopped with an error, which has been logged.
    Failed(FailureStage),
}

enum RelayError {
    UserNotFound,
    Failed(FailureStage, EventError),
}

/// Publishes a user-created envelope for every self-registration event.
#[derive(Clone)]
pub struct UserRegistrationListener {
    directory: Arc<dyn UserDirectory>,
    publisher: SharedPublisher,
}

impl UserRegistrationListener {
    pub fn new(directory: Arc<dyn UserDirectory>, publisher: SharedPublisher) -> Self {
        Self {
            directory,
            publisher,
        }
    }

    /// Handle one user event. Only `REGISTER` events are relayed.
    pub async fn on_event(&self, event: &LifecycleEvent) -> ListenerOutcome {
        if event.event_type != EventType::Register {
            debug!(event_type = %event.event_type, "Ignoring event");
            return ListenerOutcome::Ignored;
        }

        info!(
            user_id = %event.user_id,
            realm = %event.realm_id,
            "Processing REGISTER event"
        );

        match self.relay(event).await {
            Ok(receipt) => {
                info!(
                    user_id = %event.user_id,
                    topic = %receipt.topic,
                    partition = receipt.partition,
                    offset = receipt.offset,
                    "Published user created event"
                );
                ListenerOutcome::Published(receipt)
            }
            Err(RelayError::UserNotFound) => {
                warn!(
                    user_id = %event.user_id,
                    realm = %event.realm_id,
                    "User not found for REGISTER event"
                );
                ListenerOutcome::UserNotFound
            }
            Err(RelayError::Failed(stage, e)) => {
                error!(
                    user_id = %event.user_id,
                    realm = %event.realm_id,
                    stage = ?stage,
                    error = %e,
                    "Error processing REGISTER event"
                );
                ListenerOutcome::Failed(stage)
            }
        }
    }

    /// Handle one admin event. Admin-created users are not relayed yet.
    pub async fn on_admin_event(&self, event: &AdminEvent) -> ListenerOutcome {
        debug!(
            realm = %event.realm_id,
            operation = %event.operation_type,
            resource_type = event.resource_type.as_deref().unwrap_or("-"),
            "Ignoring admin event"
        );
        ListenerOutcome::Ignored
    }

    async fn relay(&self, event: &LifecycleEvent) -> Result<DeliveryReceipt, RelayError> {
        let user = self
            .directory
            .find_user(&event.realm_id, &event.user_id)
            .await
            .map_err(|e| RelayError::Failed(FailureStage::Lookup, e))?
            .ok_or(RelayError::UserNotFound)?;

        let envelope = UserCreatedEnvelope::from_user(user.as_ref())
            .map_err(|e| RelayError::Failed(FailureStage::Build, e))?;

        debug!(
            user_id = %envelope.keycloak_id(),
            correlation_id = %envelope.correlation_id(),
            attributes = envelope.attributes().len(),
            "Built user created envelope"
        );

        self.publisher
            .publish(&envelope)
            .await
            .map_err(|e| RelayError::Failed(FailureStage::Publish, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Publisher;
    use crate::testing::{InMemoryBroker, InMemoryDirectory, StaticUser};

    const REALM: &str = "cryptojackpot";

    fn listener_with(
        directory: Arc<InMemoryDirectory>,
        broker: Arc<InMemoryBroker>,
    ) -> UserRegistrationListener {
        UserRegistrationListener::new(
            directory,
            SharedPublisher::new(Publisher::new(broker, "keycloak-user-created")),
        )
    }

    #[tokio::test]
    async fn test_non_register_events_are_ignored() {
        let directory = InMemoryDirectory::new().shared();
        directory.insert(REALM, StaticUser::new("u1"));
        let broker = Arc::new(InMemoryBroker::new());
        let listener = listener_with(directory.clone(), broker.clone());

        for event_type in [
            EventType::Login,
            EventType::UpdateProfile,
            EventType::DeleteAccount,
            EventType::Other("ADMIN_UPDATE".to_string()),
        ] {
            let event = LifecycleEvent {
                event_type,
                ..LifecycleEvent::register(REALM, "u1")
            };
            assert_eq!(listener.on_event(&event).await, ListenerOutcome::Ignored);
        }

        assert_eq!(directory.lookup_count(), 0);
        assert_eq!(broker.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_lookup_is_scoped_to_event_realm() {
        let directory = InMemoryDirectory::new().shared();
        directory.insert("other-realm", StaticUser::new("u1"));
        let broker = Arc::new(InMemoryBroker::new());
        let listener = listener_with(directory, broker.clone());

        let outcome = listener.on_event(&LifecycleEvent::register(REALM, "u1")).await;

        assert_eq!(outcome, ListenerOutcome::UserNotFound);
        assert_eq!(broker.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_directory_error_is_contained() {
        let directory = InMemoryDirectory::new().shared();
        directory.fail_with("connection refused");
        let broker = Arc::new(InMemoryBroker::new());
        let listener = listener_with(directory, broker.clone());

        let outcome = listener.on_event(&LifecycleEvent::register(REALM, "u1")).await;

        assert_eq!(outcome, ListenerOutcome::Failed(FailureStage::Lookup));
        assert_eq!(broker.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_user_without_id_is_not_published() {
        let directory = InMemoryDirectory::new().shared();
        directory.insert(REALM, StaticUser::new("").with_email("blank@x.com"));
        let broker = Arc::new(InMemoryBroker::new());
        let listener = listener_with(directory, broker.clone());

        let outcome = listener.on_event(&LifecycleEvent::register(REALM, "")).await;

        assert_eq!(outcome, ListenerOutcome::Failed(FailureStage::Build));
        assert_eq!(broker.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_closed_publisher_is_a_publish_failure() {
        let directory = InMemoryDirectory::new().shared();
        directory.insert(REALM, StaticUser::new("u1"));
        let broker = Arc::new(InMemoryBroker::new());
        let publisher = SharedPublisher::new(Publisher::new(broker.clone(), "t"));
        let listener = UserRegistrationListener::new(directory, publisher.clone());

        publisher.shutdown().await.unwrap();
        let outcome = listener.on_event(&LifecycleEvent::register(REALM, "u1")).await;

        assert_eq!(outcome, ListenerOutcome::Failed(FailureStage::Publish));
        assert_eq!(broker.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_admin_events_are_ignored() {
        let directory = InMemoryDirectory::new().shared();
        let broker = Arc::new(InMemoryBroker::new());
        let listener = listener_with(directory.clone(), broker.clone());

        let event = AdminEvent {
            realm_id: REALM.to_string(),
            operation_type: "CREATE".to_string(),
            resource_type: Some("USER".to_string()),
            resource_path: Some("users/u1".to_string()),
            time: None,
        };

        assert_eq!(listener.on_admin_event(&event).await, ListenerOutcome::Ignored);
        assert_eq!(directory.lookup_count(), 0);
        assert_eq!(broker.send_attempts(), 0);
    }
}
