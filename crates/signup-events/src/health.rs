//! Health check types.

use serde::{Deserialize, Serialize};

/// Health status of the broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the connection is established.
    pub connected: bool,
    /// Number of brokers discovered.
    pub brokers: usize,
    /// Whether the publish topic exists on the cluster.
    pub topic_available: bool,
}

impl HealthStatus {
    /// Status reported when the broker cannot be reached.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            brokers: 0,
            topic_available: false,
        }
    }

    /// Check if the connection is healthy.
    ///
    /// A missing topic is not unhealthy on its own: clusters with
    /// auto-creation enabled create it on first publish.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connected && self.brokers > 0
    }
}
