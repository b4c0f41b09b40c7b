//! Inbound identity-provider types: lifecycle events and user lookup.
//!
//! These mirror the shapes Keycloak emits through its event listener SPI,
//! reduced to the fields the relay actually reads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EventError;

/// User event type as reported by Keycloak.
///
/// Only [`EventType::Register`] is acted on. Unknown tags are kept verbatim
/// in [`EventType::Other`] so new Keycloak versions never fail to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A user created their own account.
    Register,
    Login,
    LoginError,
    Logout,
    UpdateProfile,
    UpdateEmail,
    VerifyEmail,
    DeleteAccount,
    Other(String),
}

impl EventType {
    /// Keycloak's wire name for this event type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Register => "REGISTER",
            Self::Login => "LOGIN",
            Self::LoginError => "LOGIN_ERROR",
            Self::Logout => "LOGOUT",
            Self::UpdateProfile => "UPDATE_PROFILE",
            Self::UpdateEmail => "UPDATE_EMAIL",
            Self::VerifyEmail => "VERIFY_EMAIL",
            Self::DeleteAccount => "DELETE_ACCOUNT",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "REGISTER" => Self::Register,
            "LOGIN" => Self::Login,
            "LOGIN_ERROR" => Self::LoginError,
            "LOGOUT" => Self::Logout,
            "UPDATE_PROFILE" => Self::UpdateProfile,
            "UPDATE_EMAIL" => Self::UpdateEmail,
            "VERIFY_EMAIL" => Self::VerifyEmail,
            "DELETE_ACCOUNT" => Self::DeleteAccount,
            _ => Self::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user lifecycle event delivered by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Realm the event occurred in; scopes the user lookup.
    pub realm_id: String,
    /// Subject user of the event.
    pub user_id: String,
    /// When the event occurred, in epoch milliseconds.
    #[serde(default)]
    pub time: Option<i64>,
}

impl LifecycleEvent {
    /// Convenience constructor for a self-registration event.
    pub fn register(realm_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Register,
            realm_id: realm_id.into(),
            user_id: user_id.into(),
            time: None,
        }
    }
}

/// An administrative event (changes made through the admin console or API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEvent {
    pub realm_id: String,
    /// CREATE, UPDATE, DELETE or ACTION.
    pub operation_type: String,
    /// USER, GROUP, CLIENT, ...
    #[serde(default)]
    pub resource_type: Option<String>,
    /// e.g. `users/8f1c...`
    #[serde(default)]
    pub resource_path: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
}

/// Read access to a user held by the identity provider.
pub trait UserRecord: Send + Sync {
    /// Stable user identifier.
    fn id(&self) -> &str;
    fn email(&self) -> Option<&str>;
    fn first_name(&self) -> Option<&str>;
    fn last_name(&self) -> Option<&str>;
    fn email_verified(&self) -> bool;

    /// All values of a multi-valued attribute, in stored order.
    /// Empty when the user has no such attribute.
    fn attribute_values(&self, name: &str) -> Vec<String>;
}

/// Capability to resolve a user reference to a full record.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by id within a realm.
    ///
    /// Returns `Ok(None)` when the user does not exist, which is expected
    /// when the account was removed between the event and the lookup.
    async fn find_user(
        &self,
        realm: &str,
        user_id: &str,
    ) -> Result<Option<Box<dyn UserRecord>>, EventError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_event_from_keycloak_json() {
        let json = r#"{
            "time": 1760000000000,
            "type": "REGISTER",
            "realmId": "cryptojackpot",
            "clientId": "web",
            "userId": "0f0d3c1e-1111-2222-3333-444455556666",
            "ipAddress": "10.0.0.1"
        }"#;

        let event: LifecycleEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, EventType::Register);
        assert_eq!(event.realm_id, "cryptojackpot");
        assert_eq!(event.user_id, "0f0d3c1e-1111-2222-3333-444455556666");
        assert_eq!(event.time, Some(1_760_000_000_000));
    }

    #[test]
    fn test_unknown_event_type_is_preserved() {
        let event: LifecycleEvent =
            serde_json::from_str(r#"{"type":"CODE_TO_TOKEN","realmId":"r","userId":"u"}"#)
                .unwrap();

        assert_eq!(event.event_type, EventType::Other("CODE_TO_TOKEN".to_string()));
        assert_eq!(event.event_type.to_string(), "CODE_TO_TOKEN");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CODE_TO_TOKEN");
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(EventType::from("REGISTER".to_string()), EventType::Register);
        assert_eq!(String::from(EventType::UpdateProfile), "UPDATE_PROFILE");
        assert_eq!(EventType::LoginError.as_str(), "LOGIN_ERROR");
    }

    #[test]
    fn test_admin_event_from_keycloak_json() {
        let json = r#"{
            "realmId": "cryptojackpot",
            "operationType": "UPDATE",
            "resourceType": "USER",
            "resourcePath": "users/u1"
        }"#;

        let event: AdminEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.operation_type, "UPDATE");
        assert_eq!(event.resource_path.as_deref(), Some("users/u1"));
        assert!(event.time.is_none());
    }
}
