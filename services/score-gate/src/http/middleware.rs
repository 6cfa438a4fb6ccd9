//! Correlation Middleware
//!
//! Resolves the request's correlation id once, makes it available to
//! handlers as an extension, runs the request inside a span carrying it and
//! echoes it on the response.

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info_span, Instrument};

use crate::correlation::{CorrelationId, CORRELATION_HEADER};

/// Attaches a [`CorrelationId`] to the request and response.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = CorrelationId::from_caller(
        request
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    request.extensions_mut().insert(correlation_id.clone());

    let span = info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
