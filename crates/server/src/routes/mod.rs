use axum::{http::HeaderMap, http::StatusCode, Json};
use serde::Serialize;

use tripflow_core::domain::user::{UserId, UserRole};
use tripflow_core::domain::AgencyId;
use tripflow_core::errors::{ApplicationError, InterfaceError};

pub mod approvals;
pub mod automation;

pub const AGENCY_HEADER: &str = "x-agency-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: message.into() }))
}

/// Map a layered application failure to a user-safe response, logging the
/// detailed error under the request's correlation id.
pub fn interface_error(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!(
        event_name = "api.request_failed",
        correlation_id,
        error = %interface,
        "request failed"
    );
    api_error(status, interface.user_message())
}

/// Caller identity, resolved upstream and carried as headers. Session
/// issuance is a collaborator's concern; these headers are its contract.
#[derive(Clone, Debug)]
pub struct ActorContext {
    pub agency_id: AgencyId,
    pub user_id: UserId,
    pub role: UserRole,
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, ApiError> {
    let agency = header_value(headers, AGENCY_HEADER)?;
    let user = header_value(headers, USER_HEADER)?;
    let role_raw = header_value(headers, ROLE_HEADER)?;
    let role = UserRole::parse(&role_raw).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("unknown role `{role_raw}` (expected admin|planner)"),
        )
    })?;

    Ok(ActorContext { agency_id: AgencyId(agency), user_id: UserId(user), role })
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, format!("missing required header `{name}`"))
        })
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, StatusCode};

    use tripflow_core::domain::user::UserRole;

    use super::actor_from_headers;

    fn headers(agency: &str, user: &str, role: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("x-agency-id", HeaderValue::from_str(agency).unwrap());
        map.insert("x-user-id", HeaderValue::from_str(user).unwrap());
        map.insert("x-user-role", HeaderValue::from_str(role).unwrap());
        map
    }

    #[test]
    fn full_header_set_resolves_an_actor() {
        let actor = actor_from_headers(&headers("agency-1", "user-1", "admin")).expect("actor");
        assert_eq!(actor.agency_id.0, "agency-1");
        assert_eq!(actor.role, UserRole::Admin);
    }

    #[test]
    fn missing_or_unknown_values_are_bad_requests() {
        let mut incomplete = HeaderMap::new();
        incomplete.insert("x-agency-id", HeaderValue::from_static("agency-1"));
        let (status, _) = actor_from_headers(&incomplete).expect_err("missing user header");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = actor_from_headers(&headers("agency-1", "user-1", "superuser"))
            .expect_err("unknown role");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
