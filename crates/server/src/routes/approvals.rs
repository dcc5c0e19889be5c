//! Approval API surface: create, list, approve, deny.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use tripflow_core::domain::approval::{
    ApprovalAction, ApprovalRequest, ApprovalRequestId, ApprovalStatus,
};
use tripflow_core::errors::ApplicationError;
use tripflow_engine::{ApprovalServiceError, ExecutionOutcome};

use super::{actor_from_headers, api_error, interface_error, ApiError};
use crate::bootstrap::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/approvals", post(create).get(list))
        .route("/api/approvals/{id}/approve", post(approve))
        .route("/api/approvals/{id}/deny", post(deny))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateApprovalBody {
    entity_type: String,
    entity_id: String,
    action: ApprovalAction,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolveBody {
    #[serde(default)]
    response_note: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApproveResponse {
    request: ApprovalRequest,
    execution: ExecutionOutcome,
}

fn map_service_error(error: ApprovalServiceError, correlation_id: &str) -> ApiError {
    match error {
        ApprovalServiceError::DuplicatePending | ApprovalServiceError::AlreadyResolved => {
            api_error(StatusCode::CONFLICT, error.to_string())
        }
        ApprovalServiceError::Validation(inner) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, inner.to_string())
        }
        ApprovalServiceError::NotFound => api_error(StatusCode::NOT_FOUND, error.to_string()),
        ApprovalServiceError::NotAuthorized => api_error(StatusCode::FORBIDDEN, error.to_string()),
        ApprovalServiceError::Repository(inner) => {
            interface_error(ApplicationError::Persistence(inner.to_string()), correlation_id)
        }
    }
}

async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateApprovalBody>,
) -> Result<(StatusCode, Json<ApprovalRequest>), ApiError> {
    let actor = actor_from_headers(&headers)?;

    let request = state
        .approvals
        .create(
            &actor.agency_id,
            &actor.user_id,
            body.action,
            &body.entity_type,
            &body.entity_id,
            Utc::now(),
        )
        .await
        .map_err(|error| map_service_error(error, &body.entity_id))?;

    info!(
        event_name = "approvals.requested",
        request_id = %request.id.0,
        action_type = request.action.action_type(),
        entity_type = %request.entity_type,
        entity_id = %request.entity_id,
        "approval request created"
    );

    Ok((StatusCode::CREATED, Json(request)))
}

async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ApprovalRequest>>, ApiError> {
    let actor = actor_from_headers(&headers)?;

    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(ApprovalStatus::parse(raw).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, format!("unknown status filter `{raw}`"))
        })?),
    };

    let requests = state
        .approvals
        .list(&actor.agency_id, &actor.user_id, actor.role, status)
        .await
        .map_err(|error| map_service_error(error, "approvals.list"))?;

    Ok(Json(requests))
}

async fn approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ResolveBody>>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let note = body.and_then(|Json(body)| body.response_note);
    let request_id = ApprovalRequestId(id);

    let (request, execution) = state
        .approvals
        .approve(&actor.agency_id, &request_id, &actor.user_id, actor.role, note, Utc::now())
        .await
        .map_err(|error| map_service_error(error, &request_id.0))?;

    info!(
        event_name = "approvals.approved",
        request_id = %request.id.0,
        status = request.status.as_str(),
        applied = execution.is_applied(),
        "approval resolved"
    );

    Ok(Json(ApproveResponse { request, execution }))
}

async fn deny(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ResolveBody>>,
) -> Result<Json<ApprovalRequest>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let note = body.and_then(|Json(body)| body.response_note);
    let request_id = ApprovalRequestId(id);

    let request = state
        .approvals
        .deny(&actor.agency_id, &request_id, &actor.user_id, actor.role, note, Utc::now())
        .await
        .map_err(|error| map_service_error(error, &request_id.0))?;

    info!(
        event_name = "approvals.denied",
        request_id = %request.id.0,
        "approval denied"
    );

    Ok(Json(request))
}
