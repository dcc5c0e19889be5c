//! Request idempotency middleware.
//!
//! Mutating calls carrying an `Idempotency-Key` header (scoped by the
//! `X-Agency-Id` tenant header) are guarded by the process-wide cache:
//! a replayed key short-circuits with the previously cached status and body,
//! an in-flight duplicate gets `409 Conflict`, and anything else executes
//! normally with a successful response cached for five minutes. Requests
//! without the header pass through untouched.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};

use tripflow_core::domain::AgencyId;
use tripflow_core::idempotency::{BeginOutcome, IdempotencyKey};

use crate::bootstrap::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const AGENCY_HEADER: &str = "x-agency-id";
pub const REPLAY_HEADER: &str = "idempotency-replayed";

fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

pub async fn idempotency_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }

    let client_key = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);
    let agency = request
        .headers()
        .get(AGENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);

    // Backward compatible: no key (or no tenant to scope it by) means no
    // idempotency handling at all.
    let (Some(client_key), Some(agency)) = (client_key, agency) else {
        return next.run(request).await;
    };

    let key = IdempotencyKey::scoped(&AgencyId(agency), &client_key);
    match state.idempotency.begin(&key, Utc::now()) {
        BeginOutcome::Replay(cached) => {
            debug!(
                event_name = "idempotency.replayed",
                key = key.as_str(),
                status = cached.status,
                "replaying cached response for duplicate submission"
            );
            cached_response(cached.status, cached.body)
        }
        BeginOutcome::InFlight => {
            warn!(
                event_name = "idempotency.in_flight_conflict",
                key = key.as_str(),
                "duplicate arrived while the original request is still processing"
            );
            cached_response(
                StatusCode::CONFLICT.as_u16(),
                r#"{"error":"a request with this idempotency key is still processing"}"#
                    .to_string(),
            )
        }
        BeginOutcome::Started => {
            let response = next.run(request).await;
            let (parts, body) = response.into_parts();
            let bytes = match axum::body::to_bytes(body, usize::MAX).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(
                        event_name = "idempotency.body_buffering_failed",
                        key = key.as_str(),
                        error = %error,
                        "failed to buffer response body, releasing the key"
                    );
                    state.idempotency.complete(
                        &key,
                        StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        String::new(),
                        Utc::now(),
                    );
                    return Response::from_parts(parts, Body::empty());
                }
            };

            state.idempotency.complete(
                &key,
                parts.status.as_u16(),
                String::from_utf8_lossy(&bytes).into_owned(),
                Utc::now(),
            );
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

fn cached_response(status: u16, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response.headers_mut().insert(REPLAY_HEADER, HeaderValue::from_static("true"));
    response
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use crate::bootstrap::{bootstrap_with_config, router, test_config};

    static HANDLER_CALLS: AtomicU32 = AtomicU32::new(0);

    async fn test_state() -> crate::bootstrap::AppState {
        bootstrap_with_config(test_config()).await.expect("bootstrap").state
    }

    fn counting_router(state: crate::bootstrap::AppState) -> Router {
        Router::new()
            .route(
                "/api/echo",
                post(|| async {
                    let call = HANDLER_CALLS.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(json!({ "call": call }))
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                state,
                super::idempotency_layer,
            ))
    }

    fn request(key: Option<&str>) -> axum::http::Request<axum::body::Body> {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/api/echo")
            .header("x-agency-id", "agency-1");
        if let Some(key) = key {
            builder = builder.header("idempotency-key", key);
        }
        builder.body(axum::body::Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn keyed_duplicate_submissions_replay_the_first_response() {
        let state = test_state().await;
        let app = counting_router(state);

        let first = app.clone().oneshot(request(Some("req-replay"))).await.expect("first");
        let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.expect("body");
        let first_value: Value = serde_json::from_slice(&first_body).expect("json");

        let second = app.clone().oneshot(request(Some("req-replay"))).await.expect("second");
        assert_eq!(second.headers().get("idempotency-replayed").map(|v| v.to_str().unwrap()), Some("true"));
        let second_body =
            axum::body::to_bytes(second.into_body(), usize::MAX).await.expect("body");
        let second_value: Value = serde_json::from_slice(&second_body).expect("json");

        assert_eq!(first_value, second_value, "the handler must not run twice");
    }

    #[tokio::test]
    async fn unkeyed_submissions_pass_through_every_time() {
        let state = test_state().await;
        let app = counting_router(state);

        let first = app.clone().oneshot(request(None)).await.expect("first");
        let second = app.clone().oneshot(request(None)).await.expect("second");

        let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.expect("body");
        let second_body =
            axum::body::to_bytes(second.into_body(), usize::MAX).await.expect("body");
        assert_ne!(first_body, second_body, "each unkeyed call reaches the handler");
    }

    #[tokio::test]
    async fn get_requests_are_never_intercepted() {
        let state = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/health")
                    .header("idempotency-key", "req-health")
                    .body(axum::body::Body::empty())
                    .expect("request"),
            )
            .await
            .expect("health");
        assert!(response.headers().get("idempotency-replayed").is_none());
    }
}
