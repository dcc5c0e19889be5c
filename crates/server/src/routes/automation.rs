//! Automation trigger endpoints.
//!
//! The engine has no built-in scheduler; an out-of-process cron (or an
//! admin) drives these routes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use tripflow_core::errors::ApplicationError;
use tripflow_engine::{AutomationSummary, EngineError, ScanOutcome};

use super::{actor_from_headers, api_error, interface_error, ApiError};
use crate::bootstrap::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/automation/run", post(run_all))
        .route("/api/automation/run/{rule}", post(run_rule))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct RunQuery {
    threshold: Option<i64>,
}

async fn run_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AutomationSummary>, ApiError> {
    let actor = actor_from_headers(&headers)?;

    let summary = state.engine.run_all(Utc::now()).await;
    info!(
        event_name = "automation.run_all_triggered",
        triggered_by = %actor.user_id.0,
        notifications_created = summary.notifications_created,
        tasks_created = summary.tasks_created,
        "aggregate automation run completed"
    );

    Ok(Json(summary))
}

async fn run_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rule): Path<String>,
    Query(query): Query<RunQuery>,
) -> Result<Json<ScanOutcome>, ApiError> {
    let actor = actor_from_headers(&headers)?;

    let outcome =
        state.engine.run_rule(&rule, query.threshold, Utc::now()).await.map_err(
            |error| match error {
                EngineError::UnknownRule(_) => api_error(StatusCode::NOT_FOUND, error.to_string()),
                EngineError::Repository(inner) => {
                    interface_error(ApplicationError::Persistence(inner.to_string()), &rule)
                }
            },
        )?;

    info!(
        event_name = "automation.rule_triggered",
        rule = %rule,
        triggered_by = %actor.user_id.0,
        checked = outcome.checked,
        "single rule run completed"
    );

    Ok(Json(outcome))
}
