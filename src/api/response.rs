//! Mapping of service failures onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::ServiceError;

/// A service failure on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    error: ServiceError,
    /// Include internal error detail in 500 bodies.
    debug: bool,
}

impl ApiError {
    pub fn new(error: ServiceError, debug: bool) -> Self {
        Self { error, debug }
    }

    pub fn error(&self) -> &ServiceError {
        &self.error
    }

    pub fn status(&self) -> StatusCode {
        status_of(&self.error)
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self::new(error, false)
    }
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upstream status when it is a usable error status, else 502.
fn upstream_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

pub fn status_of(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Unauthenticated | ServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ServiceError::UpstreamHttpFailure { status, .. } => upstream_status(*status),
        ServiceError::UpstreamUnreachable { .. } => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::Internal(_) | ServiceError::PasswordHashing(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn internal_body(detail: String, debug: bool) -> serde_json::Value {
    json!({
        "success": false,
        "message": "Failed to process request",
        "error": if debug { detail } else { "Internal server error".to_string() },
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.error {
            ServiceError::ValidationFailed(errors) => json!({
                "message": "Validation failed",
                "errors": errors,
            }),
            ServiceError::Unauthenticated => json!({"message": "Unauthenticated."}),
            ServiceError::InvalidCredentials => json!({"message": "Unauthorized"}),
            ServiceError::NotFound { entity, .. } => json!({
                "success": false,
                "message": format!("{} not found", capitalized(entity)),
            }),
            ServiceError::Forbidden { entity, .. } => json!({
                "success": false,
                "message": format!("Unauthorized to access this {entity}"),
            }),
            ServiceError::UpstreamHttpFailure { status, body } => json!({
                "success": false,
                "message": "Failed to generate content",
                "error": body,
                "status": status,
            }),
            ServiceError::UpstreamUnreachable { .. } => json!({
                "success": false,
                "message": "Connection timeout or network error",
                "error": "Unable to reach content generation service",
            }),
            ServiceError::Internal(e) => internal_body(e.to_string(), self.debug),
            ServiceError::PasswordHashing(detail) => internal_body(detail, self.debug),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;
    use crate::error::DatabaseError;

    async fn render(error: ServiceError, debug: bool) -> (StatusCode, Value) {
        let response = ApiError::new(error, debug).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_lists_field_errors() {
        let (status, body) = render(ServiceError::invalid("message", "The message field is required."), false).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["message"][0], "The message field is required.");
    }

    #[tokio::test]
    async fn missing_and_forbidden_conversations() {
        let (status, body) = render(
            ServiceError::NotFound {
                entity: "conversation",
                id: "x".into(),
            },
            false,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Conversation not found");
        assert_eq!(body["success"], false);

        let (status, body) = render(
            ServiceError::Forbidden {
                entity: "conversation",
                id: "x".into(),
            },
            false,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Unauthorized to access this conversation");
    }

    #[tokio::test]
    async fn upstream_failure_mirrors_status() {
        let (status, body) = render(
            ServiceError::UpstreamHttpFailure {
                status: 503,
                body: "down".into(),
            },
            false,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "down");
        assert_eq!(body["status"], 503);
    }

    #[test]
    fn non_error_upstream_status_becomes_bad_gateway() {
        assert_eq!(upstream_status(302), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream_status(99), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream_status(429), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unreachable_is_gateway_timeout() {
        let (status, body) = render(
            ServiceError::UpstreamUnreachable {
                reason: "timed out".into(),
            },
            false,
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "Unable to reach content generation service");
    }

    #[tokio::test]
    async fn internal_detail_only_in_debug() {
        let err = || ServiceError::Internal(DatabaseError::Query("no such table".into()));

        let (status, body) = render(err(), false).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");

        let (_, body) = render(err(), true).await;
        assert_eq!(body["error"], "Query failed: no such table");

        let (status, body) = render(ServiceError::PasswordHashing("bad cost".into()), false).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }
}
