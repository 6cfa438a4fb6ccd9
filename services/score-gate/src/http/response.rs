//! JSON error bodies.

use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::correlation::CorrelationId;
use crate::error::{ErrorCode, GateError};

/// Error rendered for a client, carrying the request's correlation id.
#[derive(Debug)]
pub struct ErrorResponse {
    error: GateError,
    correlation_id: CorrelationId,
}

impl ErrorResponse {
    /// Create a new error response from a `GateError`
    #[must_use]
    pub fn from_error(error: GateError, correlation_id: CorrelationId) -> Self {
        Self {
            error,
            correlation_id,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let code = self.error.code();
        let status = code.http_status();
        let correlation_id = self.correlation_id.as_str();

        let body = match code {
            ErrorCode::RateLimitExceeded => json!({
                "error": code.as_str(),
                "retry_after_seconds": self.error.retry_after().map_or(1, |d| d.as_secs()),
            }),
            ErrorCode::ValidationError => json!({
                "error": code.as_str(),
                "message": self.error.public_message(),
            }),
            ErrorCode::InitFailure | ErrorCode::InternalError => {
                error!(
                    correlation_id = %correlation_id,
                    error = ?self.error,
                    "Request failed"
                );
                json!({
                    "ok": false,
                    "error": code.as_str(),
                    "correlation_id": correlation_id,
                })
            }
            _ => json!({
                "error": code.as_str(),
                "reason": self.error.auth_reason(),
                "message": self.error.public_message(),
                "correlation_id": correlation_id,
            }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = self.error.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RateSubject;
    use axum::http::StatusCode;
    use std::time::Duration;

    #[test]
    fn test_rate_limit_sets_retry_after_header() {
        let response = ErrorResponse::from_error(
            GateError::RateLimitExceeded {
                subject: RateSubject::Pii,
                retry_after: Duration::from_secs(60),
            },
            CorrelationId::generate(),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }

    #[test]
    fn test_replay_is_unauthorized() {
        let response =
            ErrorResponse::from_error(GateError::AuthReplayed, CorrelationId::generate())
                .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
