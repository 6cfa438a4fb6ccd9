//! Endpoint handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

use super::response::ErrorResponse;
use super::SharedState;
use crate::correlation::CorrelationId;
use crate::error::GateError;
use crate::pii::PiiPayload;
use crate::scoring::{demo_report, ScoreReport, ScoreRequest};
use crate::token::Authorization;

/// Body of a successful issuance.
#[derive(Debug, Serialize)]
pub struct TokenIssueResponse {
    /// Compact JWS
    pub token: String,
    /// Seconds until expiry
    pub ttl_seconds: u64,
    /// Correlation id bound into the token
    pub correlation_id: String,
}

/// Body of a successful score check.
#[derive(Debug, Serialize)]
pub struct ScoreCheckResponse {
    /// Score data
    #[serde(flatten)]
    pub report: ScoreReport,
    /// Correlation id from the token (or the request, in demo mode)
    pub correlation_id: String,
    /// `"demo"` for canned responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
}

/// Liveness plus key readiness.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves
    pub status: &'static str,
    /// Signing key resolved
    pub issuer_ready: bool,
    /// Verification keys resolved
    pub verifier_ready: bool,
}

/// `POST /token-issue`
pub async fn token_issue(
    State(state): State<SharedState>,
    Extension(correlation_id): Extension<CorrelationId>,
    payload: Result<Json<PiiPayload>, JsonRejection>,
) -> Result<Json<TokenIssueResponse>, ErrorResponse> {
    let fail = |error| ErrorResponse::from_error(error, correlation_id.clone());

    let Json(pii) = payload.map_err(|rejection| fail(body_error(&rejection)))?;

    let result = state.issuer.issue(&pii, correlation_id.clone()).await;
    state.metrics.record_issue(&result);
    let issued = result.map_err(fail)?;

    Ok(Json(TokenIssueResponse {
        token: issued.token,
        ttl_seconds: issued.ttl_seconds,
        correlation_id: issued.correlation_id.to_string(),
    }))
}

/// `POST /score-check`
pub async fn score_check(
    State(state): State<SharedState>,
    Extension(correlation_id): Extension<CorrelationId>,
    headers: HeaderMap,
    payload: Result<Json<PiiPayload>, JsonRejection>,
) -> Result<Json<ScoreCheckResponse>, ErrorResponse> {
    let fail = |error| ErrorResponse::from_error(error, correlation_id.clone());

    let Json(pii) = payload.map_err(|rejection| fail(body_error(&rejection)))?;
    let bearer = bearer_token(&headers).map_err(fail)?;

    let result = state.verifier.verify(bearer, &pii).await;
    let outcome = match &result {
        Ok(Authorization::Token(_)) => "ok",
        Ok(Authorization::Demo) => "demo",
        Err(err) => err.code().as_str(),
    };
    state.metrics.record_verification(outcome);

    match result.map_err(fail)? {
        Authorization::Token(capability) => {
            state.metrics.tracked_nonces.inc();
            let request = ScoreRequest {
                pii_hash: capability.claims().pii_hash.clone(),
                display_name: pii.display_name().map(ToString::to_string),
            };
            let report = state.scores.score(&request).await.map_err(fail)?;
            Ok(Json(ScoreCheckResponse {
                report,
                correlation_id: capability.correlation_id().to_string(),
                mode: None,
            }))
        }
        Authorization::Demo => Ok(Json(ScoreCheckResponse {
            report: demo_report(),
            correlation_id: correlation_id.to_string(),
            mode: Some("demo"),
        })),
    }
}

/// `GET /health`
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        issuer_ready: state.issuer.is_ready(),
        verifier_ready: state.verifier.is_ready(),
    })
}

/// `GET /metrics`
pub async fn metrics(State(state): State<SharedState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Pre-flight fallback; the CORS middleware normally answers first.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn body_error(rejection: &JsonRejection) -> GateError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            GateError::validation("request body must be application/json")
        }
        _ => GateError::validation("request body must be a JSON object"),
    }
}

/// Extracts the bearer value. `Ok(None)` when no Authorization header is sent.
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, GateError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| GateError::malformed("authorization header is not ASCII"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => Ok(Some(token.trim())),
        _ => Err(GateError::malformed("authorization scheme must be Bearer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap(), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  xyz"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(matches!(
            bearer_token(&headers),
            Err(GateError::AuthMalformed { .. })
        ));
    }
}
