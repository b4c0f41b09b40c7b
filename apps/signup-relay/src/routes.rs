//! Inbound HTTP surface for identity-provider events.
//!
//! Event routes require the shared bearer token and answer `202 Accepted` as
//! soon as the body parses. Relaying happens in the background, so the
//! identity provider's own request path is never held up or failed by
//! directory or publishing trouble.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use signup_events::{AdminEvent, LifecycleEvent};
use tracing::warn;

use crate::service::RelayService;

/// Build the relay router. `/health` is left open for probes.
pub fn router(service: Arc<RelayService>, event_token: SecretString) -> Router {
    let events = Router::new()
        .route("/events", post(receive_event))
        .route("/admin-events", post(receive_admin_event))
        .route_layer(middleware::from_fn_with_state(
            Arc::new(event_token),
            require_event_token,
        ));

    Router::new()
        .merge(events)
        .route("/health", get(health))
        .with_state(service)
}

/// Reject requests that do not carry `Authorization: Bearer <event token>`.
async fn require_event_token(
    State(expected): State<Arc<SecretString>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| {
            constant_time_eq(token.as_bytes(), expected.expose_secret().as_bytes())
        });

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected event without valid token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

async fn receive_event(
    State(service): State<Arc<RelayService>>,
    Json(event): Json<LifecycleEvent>,
) -> StatusCode {
    service.dispatch(event);
    StatusCode::ACCEPTED
}

async fn receive_admin_event(
    State(service): State<Arc<RelayService>>,
    Json(event): Json<AdminEvent>,
) -> StatusCode {
    service.listener().on_admin_event(&event).await;
    StatusCode::ACCEPTED
}

async fn health(State(service): State<Arc<RelayService>>) -> Response {
    let Some(publisher) = service.publisher().get_if_initialized() else {
        return (StatusCode::OK, Json(json!({ "status": "idle" }))).into_response();
    };

    match publisher.health_check().await {
        Ok(status) if status.is_healthy() => {
            (StatusCode::OK, Json(json!({ "status": "ok", "broker": status }))).into_response()
        }
        Ok(status) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "broker": status })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        )
            .into_response(),
    }
}
