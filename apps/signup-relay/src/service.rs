//! Relay lifecycle: one publisher per process, released once at shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use signup_events::{
    EventError, KafkaBroker, KeycloakDirectory, LifecycleEvent, SharedPublisher, UserDirectory,
    UserRegistrationListener,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;

/// Owns the shared publisher and user directory for the lifetime of the process.
pub struct RelayService {
    directory: Arc<dyn UserDirectory>,
    publisher: SharedPublisher,
    in_flight: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl RelayService {
    /// Wire the Kafka publisher and Keycloak directory from configuration.
    ///
    /// No connection is opened here; the publisher connects on first use.
    pub fn init(config: &Config) -> Result<Arc<Self>, EventError> {
        info!(
            bootstrap_servers = %config.kafka.bootstrap_servers,
            topic = %config.kafka.user_created_topic,
            keycloak_url = %config.keycloak.base_url,
            "Initializing signup relay"
        );

        let kafka = config.kafka.clone();
        let publisher = SharedPublisher::lazy(move || {
            let kafka = kafka.clone();
            async move { KafkaBroker::connect(&kafka) }
        });
        let directory = Arc::new(KeycloakDirectory::new(config.keycloak.clone())?);

        Ok(Self::with_parts(directory, publisher))
    }

    /// Build a service over explicit collaborators.
    pub fn with_parts(directory: Arc<dyn UserDirectory>, publisher: SharedPublisher) -> Arc<Self> {
        Arc::new(Self {
            directory,
            publisher,
            in_flight: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Warm the publisher so the first registration does not pay for setup.
    ///
    /// Failure is not fatal: the next publish retries the connection.
    pub async fn post_init(&self) {
        match self.publisher.get().await {
            Ok(publisher) => info!(topic = %publisher.topic(), "Signup relay initialized"),
            Err(e) => warn!(error = %e, "Publisher not ready; will connect on first event"),
        }
    }

    /// A listener bound to the shared publisher.
    pub fn listener(&self) -> UserRegistrationListener {
        UserRegistrationListener::new(self.directory.clone(), self.publisher.clone())
    }

    pub fn publisher(&self) -> &SharedPublisher {
        &self.publisher
    }

    /// Relay `event` in the background and return immediately.
    ///
    /// The listener runs in its own task so a panic is logged here and goes
    /// no further.
    pub fn dispatch(&self, event: LifecycleEvent) {
        let listener = self.listener();
        let mut in_flight = self.in_flight.lock().expect("lock poisoned");
        while in_flight.try_join_next().is_some() {}

        in_flight.spawn(async move {
            let user_id = event.user_id.clone();
            let handled = tokio::spawn(async move { listener.on_event(&event).await }).await;
            if let Err(e) = handled {
                error!(user_id = %user_id, error = %e, "Event handler aborted");
            }
        });
    }

    /// Wait for every dispatched event to finish.
    pub async fn wait_idle(&self) {
        let mut pending = std::mem::take(&mut *self.in_flight.lock().expect("lock poisoned"));
        while pending.join_next().await.is_some() {}
    }

    /// Finish in-flight events, then release the publisher. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Closing signup relay");
        self.wait_idle().await;
        if let Err(e) = self.publisher.shutdown().await {
            error!(error = %e, "Publisher shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signup_events::testing::{InMemoryBroker, InMemoryDirectory, StaticUser};
    use signup_events::{LifecycleEvent, ListenerOutcome, Publisher};
    use std::sync::atomic::AtomicUsize;

    fn lazy_publisher(broker: Arc<InMemoryBroker>, connects: Arc<AtomicUsize>) -> SharedPublisher {
        SharedPublisher::lazy(move || {
            connects.fetch_add(1, Ordering::SeqCst);
            let broker = broker.clone();
            async move { Ok(Publisher::new(broker, "keycloak-user-created")) }
        })
    }

    #[tokio::test]
    async fn test_listeners_share_the_service_publisher() {
        let broker = Arc::new(InMemoryBroker::new());
        let connects = Arc::new(AtomicUsize::new(0));
        let directory = InMemoryDirectory::new().shared();
        directory.insert("acme", StaticUser::new("u1"));
        directory.insert("acme", StaticUser::new("u2"));
        let service =
            RelayService::with_parts(directory, lazy_publisher(broker.clone(), connects.clone()));

        service.post_init().await;
        let first = service.listener().on_event(&LifecycleEvent::register("acme", "u1")).await;
        let second = service.listener().on_event(&LifecycleEvent::register("acme", "u2")).await;

        assert!(matches!(first, ListenerOutcome::Published(_)));
        assert!(matches!(second, ListenerOutcome::Published(_)));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(broker.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_close_shuts_publisher_down_once() {
        let broker = Arc::new(InMemoryBroker::new());
        let connects = Arc::new(AtomicUsize::new(0));
        let service = RelayService::with_parts(
            InMemoryDirectory::new().shared(),
            lazy_publisher(broker.clone(), connects),
        );

        service.post_init().await;
        service.close().await;
        service.close().await;

        assert_eq!(broker.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_waits_for_dispatched_events() {
        let broker = Arc::new(InMemoryBroker::new());
        let directory = InMemoryDirectory::new().shared();
        directory.insert("acme", StaticUser::new("u1"));
        directory.insert("acme", StaticUser::new("u2"));
        let service = RelayService::with_parts(
            directory,
            lazy_publisher(broker.clone(), Arc::new(AtomicUsize::new(0))),
        );

        service.dispatch(LifecycleEvent::register("acme", "u1"));
        service.dispatch(LifecycleEvent::register("acme", "u2"));
        service.close().await;

        assert_eq!(broker.sent().len(), 2);
        assert_eq!(broker.close_count(), 1);
    }

    #[tokio::test]
    async fn test_events_after_close_are_contained() {
        let broker = Arc::new(InMemoryBroker::new());
        let directory = InMemoryDirectory::new().shared();
        directory.insert("acme", StaticUser::new("u1"));
        let service = RelayService::with_parts(
            directory,
            lazy_publisher(broker.clone(), Arc::new(AtomicUsize::new(0))),
        );

        service.close().await;
        let outcome = service.listener().on_event(&LifecycleEvent::register("acme", "u1")).await;

        assert!(matches!(outcome, ListenerOutcome::Failed(_)));
        assert_eq!(broker.send_attempts(), 0);
        assert_eq!(broker.close_count(), 0);
    }
}
