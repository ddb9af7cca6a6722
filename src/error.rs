// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::manager::DatabaseError;
use crate::services::attendance_service::AttendanceError;
use crate::services::pin_service::PinError;
use crate::services::report_service::ReportError;
use crate::types::PinScope;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 401 with the scope the client must unlock; UIs render this as the PIN prompt
    PinRequired { scope: PinScope, message: String },

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 422 Unprocessable Entity (validation but semantically valid JSON)
    UnprocessableEntity(String),

    // 429 Too Many Requests
    TooManyRequests { message: String, retry_after_secs: u64 },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PinRequired { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::PinRequired { message, .. } => message,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::UnprocessableEntity(msg) => msg,
            ApiError::TooManyRequests { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::PinRequired { .. } => "PIN_REQUIRED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            ApiError::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        match self {
            ApiError::ValidationError {
                field_errors: Some(field_errors),
                ..
            } => {
                response["field_errors"] = json!(field_errors);
            }
            ApiError::PinRequired { scope, .. } => {
                response["scope"] = json!(scope);
            }
            ApiError::TooManyRequests { retry_after_secs, .. } => {
                response["retry_after"] = json!(retry_after_secs);
            }
            _ => {}
        }

        response
    }
}

// Static constructor methods
impl ApiError {
    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, problem: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), problem.into());
        ApiError::validation_error("Invalid field format", Some(field_errors))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn pin_required(scope: PinScope) -> Self {
        ApiError::PinRequired {
            scope,
            message: format!("Enter the {} PIN to continue", scope),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        ApiError::UnprocessableEntity(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        ApiError::TooManyRequests {
            message: message.into(),
            retry_after_secs,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        if err.is_unavailable() {
            tracing::error!("Database unavailable: {}", err);
            return ApiError::service_unavailable("Database temporarily unavailable");
        }
        match err {
            DatabaseError::MigrationError(msg) => {
                tracing::error!("Migration error: {}", msg);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
            other => {
                // Log the real error but return generic message
                tracing::error!("Database error: {}", other);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<PinError> for ApiError {
    fn from(err: PinError) -> Self {
        match err {
            PinError::Malformed => ApiError::invalid_field("pin", err.to_string()),
            PinError::NotConfigured(scope) => {
                tracing::error!("PIN unlock attempted but no {} PIN is configured", scope);
                ApiError::service_unavailable(format!("The {} PIN has not been set up", scope))
            }
            PinError::Incorrect => ApiError::unauthorized("Incorrect PIN"),
            PinError::ScopeMismatch { required, .. } => ApiError::pin_required(required),
            PinError::Expired | PinError::Revoked | PinError::InvalidToken(_) => {
                ApiError::unauthorized("PIN session is no longer valid")
            }
            PinError::SecretMissing | PinError::Internal(_) => {
                tracing::error!("PIN processing error: {}", err);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            PinError::Database(e) => e.into(),
        }
    }
}

impl From<AttendanceError> for ApiError {
    fn from(err: AttendanceError) -> Self {
        match err {
            AttendanceError::AlreadyCheckedIn { .. } => ApiError::conflict(err.to_string()),
            AttendanceError::NotCheckedIn { .. } => ApiError::not_found(err.to_string()),
            AttendanceError::Database(e) => e.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::UnknownReport(_) => ApiError::not_found(err.to_string()),
            ReportError::WrongScope { .. } => ApiError::forbidden(err.to_string()),
            ReportError::Rejected(msg) => ApiError::unprocessable_entity(msg),
            ReportError::Database(e) => e.into(),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status_code(), Json(self.to_json())).into_response();
        if let ApiError::TooManyRequests { retry_after_secs, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn pin_required_carries_scope() {
        let err = ApiError::pin_required(PinScope::Manager);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        let body = err.to_json();
        assert_eq!(body["code"], "PIN_REQUIRED");
        assert_eq!(body["scope"], "manager");
    }

    #[test]
    fn attendance_conflicts_map_to_http() {
        let person_id = Uuid::new_v4();
        let conflict: ApiError = AttendanceError::AlreadyCheckedIn { kind: crate::types::PersonKind::Student, person_id }.into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let missing: ApiError = AttendanceError::NotCheckedIn { kind: crate::types::PersonKind::Staff, person_id }.into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn sql_details_are_not_leaked() {
        let err: ApiError = DatabaseError::Sqlx(sqlx::Error::RowNotFound).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Database error occurred");

        let down: ApiError = DatabaseError::ConfigMissing("DATABASE_URL").into();
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!down.message().contains("DATABASE_URL"));
    }

    #[test]
    fn pin_errors_map_to_http() {
        let malformed: ApiError = PinError::Malformed.into();
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
        assert!(malformed.to_json()["field_errors"]["pin"].is_string());

        let wrong: ApiError = PinError::Incorrect.into();
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.error_code(), "UNAUTHORIZED");

        let unset: ApiError = PinError::NotConfigured(PinScope::Staff).into();
        assert_eq!(unset.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn procedure_rejection_is_unprocessable() {
        let err: ApiError = ReportError::Rejected("day already approved".into()).into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.message(), "day already approved");
    }

    #[test]
    fn throttled_response_sets_retry_after() {
        let response = ApiError::too_many_requests("slow down", 42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
