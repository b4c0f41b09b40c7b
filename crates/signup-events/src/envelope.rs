//! Wire envelope for user-created events.

use crate::error::EventError;
use crate::extractor::extract_attributes;
use crate::identity::UserRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Record published to the broker when a user self-registers.
///
/// The JSON field names are a contract with downstream consumers
/// (`keycloakId` in particular) and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreatedEnvelope {
    /// When this envelope was built, not when the user registered.
    timestamp: DateTime<Utc>,

    /// Fresh identifier for tracing and consumer-side deduplication.
    correlation_id: Uuid,

    /// Identity-provider user id. Also the partition key.
    keycloak_id: String,

    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email_verified: bool,

    /// Allow-listed profile attributes, first value only.
    attributes: BTreeMap<String, String>,
}

/// Field values copied off a user record.
#[derive(Debug, Clone, Default)]
pub struct UserSnapshot {
    pub keycloak_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub attributes: BTreeMap<String, String>,
}

impl UserSnapshot {
    /// Copy the published fields off a user record, running attribute extraction.
    pub fn from_user(user: &dyn UserRecord) -> Self {
        Self {
            keycloak_id: user.id().to_string(),
            email: user.email().map(str::to_string),
            first_name: user.first_name().map(str::to_string),
            last_name: user.last_name().map(str::to_string),
            email_verified: user.email_verified(),
            attributes: extract_attributes(user),
        }
    }
}

impl UserCreatedEnvelope {
    /// Build an envelope, stamping it with a new correlation id and the current time.
    pub fn new(snapshot: UserSnapshot) -> Result<Self, EventError> {
        if snapshot.keycloak_id.trim().is_empty() {
            return Err(EventError::InvalidEnvelope {
                reason: "keycloakId is empty".to_string(),
            });
        }

        Ok(Self {
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
            keycloak_id: snapshot.keycloak_id,
            email: snapshot.email,
            first_name: snapshot.first_name,
            last_name: snapshot.last_name,
            email_verified: snapshot.email_verified,
            attributes: snapshot.attributes,
        })
    }

    /// Build an envelope straight from a user record.
    pub fn from_user(user: &dyn UserRecord) -> Result<Self, EventError> {
        Self::new(UserSnapshot::from_user(user))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn keycloak_id(&self) -> &str {
        &self.keycloak_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Broker partition key. Keeps every event for one user on one partition.
    pub fn partition_key(&self) -> &str {
        &self.keycloak_id
    }

    /// Serialize the envelope to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationFailed {
            user_id: self.keycloak_id.clone(),
            cause: e.to_string(),
        })
    }

    /// Deserialize an envelope from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::InvalidEnvelope {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticUser;

    fn sample_user() -> StaticUser {
        StaticUser::new("u1")
            .with_email("a@x.com")
            .with_name("A", "B")
            .with_email_verified(true)
            .with_attribute("country", ["US", "CA"])
    }

    #[test]
    fn test_envelope_from_user() {
        let envelope = UserCreatedEnvelope::from_user(&sample_user()).unwrap();

        assert_eq!(envelope.keycloak_id(), "u1");
        assert_eq!(envelope.email(), Some("a@x.com"));
        assert_eq!(envelope.first_name(), Some("A"));
        assert_eq!(envelope.last_name(), Some("B"));
        assert!(envelope.email_verified());
        assert_eq!(envelope.attributes()["country"], "US");
        assert_eq!(envelope.partition_key(), "u1");
    }

    #[test]
    fn test_wire_field_names() {
        let envelope = UserCreatedEnvelope::from_user(&sample_user()).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&envelope.to_json_bytes().unwrap()).unwrap();

        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "attributes",
                "correlationId",
                "email",
                "emailVerified",
                "firstName",
                "keycloakId",
                "lastName",
                "timestamp",
            ]
        );
        assert_eq!(json["keycloakId"], "u1");
        assert_eq!(json["emailVerified"], true);
        assert_eq!(json["attributes"], serde_json::json!({"country": "US"}));
        assert_eq!(
            json["correlationId"].as_str().unwrap(),
            envelope.correlation_id().to_string()
        );
        assert!(
            DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok(),
            "timestamp must be an ISO-8601 instant"
        );
    }

    #[test]
    fn test_missing_names_serialize_as_null() {
        let envelope = UserCreatedEnvelope::from_user(&StaticUser::new("u9")).unwrap();
        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert!(json["email"].is_null());
        assert!(json["firstName"].is_null());
        assert!(json["lastName"].is_null());
        assert_eq!(json["attributes"], serde_json::json!({}));
    }

    #[test]
    fn test_correlation_id_is_fresh_per_envelope() {
        let user = sample_user();
        let first = UserCreatedEnvelope::from_user(&user).unwrap();
        let second = UserCreatedEnvelope::from_user(&user).unwrap();

        assert_ne!(first.correlation_id(), second.correlation_id());
        assert_eq!(first.correlation_id().get_version_num(), 4);
        assert!(second.timestamp() >= first.timestamp());
    }

    #[test]
    fn test_empty_user_id_is_rejected() {
        let result = UserCreatedEnvelope::new(UserSnapshot {
            keycloak_id: " ".to_string(),
            ..UserSnapshot::default()
        });

        assert!(matches!(result, Err(EventError::InvalidEnvelope { .. })));
    }

    #[test]
    fn test_from_json_bytes_rejects_garbage() {
        assert!(UserCreatedEnvelope::from_json_bytes(b"not json").is_err());
    }
}
