//! CORS Middleware
//!
//! Every response, errors and pre-flight included, carries the CORS headers.
//! Pre-flight requests are answered here and never reach a handler, so they
//! succeed whatever state the key material is in.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::SharedState;

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const DEFAULT_ALLOWED_HEADERS: &str = "authorization, content-type, x-correlation-id";
const EXPOSED_HEADERS: &str = "x-correlation-id, retry-after";
const VARY: &str = "origin, access-control-request-method, access-control-request-headers";

/// Allow-list and pre-flight cache settings.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    max_age_seconds: u64,
}

impl CorsPolicy {
    /// Creates a policy from normalised origins.
    #[must_use]
    pub fn new(allowed_origins: Vec<String>, max_age_seconds: u64) -> Self {
        Self {
            allowed_origins,
            max_age_seconds,
        }
    }

    /// Whether `origin` is on the allow-list.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }

    /// Writes the CORS headers for a request with `request_headers` into `headers`.
    pub fn apply(&self, request_headers: &HeaderMap, headers: &mut HeaderMap) {
        if let Some(origin) = request_headers
            .get(header::ORIGIN)
            .filter(|origin| origin.to_str().is_ok_and(|o| self.allows(o)))
        {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }

        let allow_headers = request_headers
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS));
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from(self.max_age_seconds),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
        headers.insert(header::VARY, HeaderValue::from_static(VARY));
    }
}

/// Answers pre-flight requests and decorates every other response.
pub async fn cors_middleware(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let request_headers = request.headers().clone();

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    state.cors.apply(&request_headers, response.headers_mut());
    response
}
