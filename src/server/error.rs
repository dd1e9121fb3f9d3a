//! HTTP error type and mappings from domain errors to status codes

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::analytics::RosterError;
use crate::checkin::CheckInError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Check-in refused by a business rule, with a stable discriminant
    #[error("{message}")]
    CheckIn {
        status: StatusCode,
        kind: &'static str,
        message: String,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
    /// Stable error type for client-side handling
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    error_type: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::CheckIn { status, kind, message } => (status, message, Some(kind)),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            ApiError::Internal(msg) => {
                error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
            error_type,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<CheckInError> for ApiError {
    fn from(err: CheckInError) -> Self {
        let message = err.to_string();
        let (status, kind) = match &err {
            CheckInError::UnknownStudent(_) => (StatusCode::NOT_FOUND, "unknown_student"),
            CheckInError::UnknownCourse(_) => (StatusCode::NOT_FOUND, "unknown_course"),
            CheckInError::NoCourseToday => (StatusCode::UNPROCESSABLE_ENTITY, "no_course_today"),
            CheckInError::TooEarly { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "too_early"),
            CheckInError::Rejected(_) => (StatusCode::FORBIDDEN, "rejected"),
            CheckInError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            CheckInError::Duplicate => (StatusCode::CONFLICT, "duplicate"),
            CheckInError::Verification(_) => (StatusCode::SERVICE_UNAVAILABLE, "verification_failed"),
            CheckInError::Schedule(_) | CheckInError::Storage(_) => {
                return ApiError::Internal(message);
            }
        };
        ApiError::CheckIn { status, kind, message }
    }
}

impl From<RosterError> for ApiError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::UnknownCourse(id) => ApiError::NotFound(format!("Unknown course: {}", id)),
            e @ (RosterError::NotScheduled { .. } | RosterError::FutureDate(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            e @ RosterError::SessionOpen { .. } => ApiError::Conflict(e.to_string()),
            e @ (RosterError::Schedule(_) | RosterError::Storage(_)) => ApiError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_in_errors_map_to_statuses() {
        let cases = [
            (CheckInError::Duplicate, StatusCode::CONFLICT),
            (CheckInError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (CheckInError::Rejected("spoofing detected".into()), StatusCode::FORBIDDEN),
            (CheckInError::UnknownStudent("9".into()), StatusCode::NOT_FOUND),
            (
                CheckInError::TooEarly { early_buffer: 15, opens_at: "08:45".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (CheckInError::Storage(anyhow::anyhow!("disk full")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_roster_errors_map_to_statuses() {
        let not_found = ApiError::from(RosterError::UnknownCourse("x".into())).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let bad = ApiError::from(RosterError::NotScheduled {
            code: "CS101".into(),
            day: "Tuesday".into(),
        })
        .into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let open = ApiError::from(RosterError::SessionOpen {
            code: "CS101".into(),
            closes_at: "09:10".into(),
        })
        .into_response();
        assert_eq!(open.status(), StatusCode::CONFLICT);
    }
}
