//! User lookup through the Keycloak admin REST API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::KeycloakConfig;
use crate::error::EventError;
use crate::identity::{UserDirectory, UserRecord};

/// User representation returned by `GET /admin/realms/{realm}/users/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl UserRecord for KeycloakUser {
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

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the grace period.
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Upper bound on a single admin API request, token requests included.
pub const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Whether `value` can stand as one URL path segment once percent-encoded.
///
/// Dot segments are collapsed during URL normalization and would address a
/// different resource.
fn is_path_segment(value: &str) -> bool {
    !value.is_empty() && value != "." && value != ".."
}

/// [`UserDirectory`] backed by Keycloak's admin API, authenticated with a
/// service-account client (client-credentials grant).
#[derive(Debug)]
pub struct KeycloakDirectory {
    config: KeycloakConfig,
    http_client: reqwest::Client,
    cached_token: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

impl KeycloakDirectory {
    /// Create a directory whose requests give up after [`REQUEST_TIMEOUT`].
    pub fn new(config: KeycloakConfig) -> Result<Self, EventError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EventError::ConfigInvalid {
                var: "KEYCLOAK_URL".to_string(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self::with_http_client(config, http_client))
    }

    pub fn with_http_client(config: KeycloakConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            cached_token: RwLock::new(None),
            grace_period: Duration::seconds(30),
        }
    }

    async fn token(&self) -> Result<String, EventError> {
        {
            let cache = self.cached_token.read().await;
            if let Some(token) = cache.as_ref() {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        // Another lookup may have refreshed the token while we waited.
        let mut cache = self.cached_token.write().await;
        if let Some(token) = cache.as_ref() {
            if !token.is_expired(self.grace_period) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.acquire_token().await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }

    #[instrument(skip(self), fields(admin_realm = %self.config.admin_realm))]
    async fn acquire_token(&self) -> Result<CachedToken, EventError> {
        let token_url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.config.base_url, self.config.admin_realm
        );

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| EventError::DirectoryAuth {
                cause: format!("Token request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EventError::DirectoryAuth {
                cause: format!("Token request failed with status {status}: {body}"),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| EventError::DirectoryAuth {
            cause: format!("Failed to parse token response: {e}"),
        })?;

        debug!(expires_in = token.expires_in, "Acquired admin token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }

    async fn invalidate_token(&self) {
        *self.cached_token.write().await = None;
    }

    async fn fetch_user(
        &self,
        realm: &str,
        user_id: &str,
    ) -> Result<(StatusCode, Option<KeycloakUser>), EventError> {
        let token = self.token().await?;
        let url = format!(
            "{}/admin/realms/{}/users/{}",
            self.config.base_url,
            urlencoding::encode(realm),
            urlencoding::encode(user_id)
        );

        let lookup_error = |cause: String| EventError::DirectoryFailed {
            realm: realm.to_string(),
            user_id: user_id.to_string(),
            cause,
        };

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Ok((status, None));
        }

        let user = response
            .json::<KeycloakUser>()
            .await
            .map_err(|e| lookup_error(format!("Invalid user representation: {e}")))?;
        Ok((status, Some(user)))
    }
}

#[async_trait]
impl UserDirectory for KeycloakDirectory {
    #[instrument(skip(self))]
    async fn find_user(
        &self,
        realm: &str,
        user_id: &str,
    ) -> Result<Option<Box<dyn UserRecord>>, EventError> {
        if !is_path_segment(realm) || !is_path_segment(user_id) {
            warn!("Realm or user id cannot address a single user");
            return Ok(None);
        }

        let (mut status, mut user) = self.fetch_user(realm, user_id).await?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("Admin token rejected, refreshing");
            self.invalidate_token().await;
            (status, user) = self.fetch_user(realm, user_id).await?;
        }

        match (status, user) {
            (_, Some(user)) => Ok(Some(Box::new(user))),
            (StatusCode::NOT_FOUND, None) => Ok(None),
            (status, None) => Err(EventError::DirectoryFailed {
                realm: realm.to_string(),
                user_id: user_id.to_string(),
                cause: format!("unexpected status {status}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_expiry() {
        let token = CachedToken {
            access_token: "test".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
        };

        assert!(!token.is_expired(Duration::minutes(5)));
        assert!(token.is_expired(Duration::minutes(15)));
    }

    #[test]
    fn test_dot_segments_are_not_path_segments() {
        assert!(is_path_segment("8f1c2d"));
        assert!(is_path_segment("nobody/../victim"));
        assert!(!is_path_segment(""));
        assert!(!is_path_segment("."));
        assert!(!is_path_segment(".."));
    }

    #[test]
    fn test_keycloak_user_from_admin_json() {
        let json = r#"{
            "id": "u1",
            "username": "a@x.com",
            "email": "a@x.com",
            "firstName": "A",
            "emailVerified": true,
            "enabled": true,
            "createdTimestamp": 1760000000000,
            "attributes": { "country": ["US", "CA"], "phone": [] },
            "requiredActions": []
        }"#;

        let user: KeycloakUser = serde_json::from_str(json).unwrap();

        assert_eq!(UserRecord::id(&user), "u1");
        assert_eq!(UserRecord::first_name(&user), Some("A"));
        assert_eq!(UserRecord::last_name(&user), None);
        assert_eq!(user.attribute_values("country"), vec!["US", "CA"]);
        assert!(user.attribute_values("phone").is_empty());
        assert!(user.attribute_values("city").is_empty());
    }

    #[test]
    fn test_keycloak_user_without_attributes() {
        let user: KeycloakUser = serde_json::from_str(r#"{"id":"u2"}"#).unwrap();

        assert!(!user.email_verified);
        assert!(user.attributes.is_empty());
    }
}
