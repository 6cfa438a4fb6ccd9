//! Shared fixtures: generated Ed25519 JWKs, router construction and
//! request helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::SigningKey;
use http_body_util::BodyExt;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use tower::ServiceExt;

use score_gate::observability::GateMetrics;
use score_gate::{create_router, AppState, Config, SharedState, Stores};

pub const ALLOWED_ORIGIN: &str = "https://app.example.com";

/// Generated key pair rendered as JWKs.
pub struct TestKey {
    pub kid: String,
    pub private_jwk: String,
    pub public_jwk: String,
}

impl TestKey {
    pub fn generate(kid: &str) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
        let d = URL_SAFE_NO_PAD.encode(signing_key.to_bytes());
        Self {
            kid: kid.to_string(),
            private_jwk: json!({"kty": "OKP", "crv": "Ed25519", "kid": kid, "x": x, "d": d})
                .to_string(),
            public_jwk: json!({"kty": "OKP", "crv": "Ed25519", "kid": kid, "x": x}).to_string(),
        }
    }
}

pub fn lookup(pairs: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<&'static str, String> = pairs.into_iter().collect();
    move |name| map.get(name).cloned()
}

pub fn test_config() -> Config {
    Config {
        cors_allowed_origins: vec![ALLOWED_ORIGIN.to_string()],
        ..Config::default()
    }
}

/// State plus router, so tests can reach the issuer directly.
pub struct TestApp {
    pub state: SharedState,
    pub router: Router,
    pub stores: Stores,
}

impl TestApp {
    pub fn new(config: &Config, sources: Vec<(&'static str, String)>) -> Self {
        let stores = Stores::in_memory();
        let metrics = GateMetrics::new().unwrap();
        let state = Arc::new(AppState::new(config, lookup(sources), &stores, metrics));
        let router = create_router(Arc::clone(&state));
        Self {
            state,
            router,
            stores,
        }
    }

    /// App whose issuer and verifier share one signing key.
    pub fn shared_key() -> (Self, TestKey) {
        let key = TestKey::generate("shared-1");
        let app = Self::new(
            &test_config(),
            vec![("SCORE_SIGNING_JWK", key.private_jwk.clone())],
        );
        (app, key)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn issue(&self, payload: &Value, correlation_id: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(id) = correlation_id {
            headers.push(("x-correlation-id", id.to_string()));
        }
        self.send(post_json("/token-issue", payload, &headers)).await
    }

    pub async fn check(&self, token: Option<&str>, payload: &Value) -> TestResponse {
        let mut headers = vec![];
        if let Some(token) = token {
            headers.push(("authorization", format!("Bearer {token}")));
        }
        self.send(post_json("/score-check", payload, &headers)).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn post_json(uri: &str, body: &Value, headers: &[(&str, String)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("origin", ALLOWED_ORIGIN);
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn preflight(uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri(uri)
        .header("origin", origin)
        .header("access-control-request-method", "POST")
        .header(
            "access-control-request-headers",
            "authorization, content-type",
        )
        .body(Body::empty())
        .unwrap()
}

pub fn pii(national_id: &str) -> Value {
    json!({
        "full_name": "Ana Souza",
        "email": "ana@example.com",
        "national_id": national_id,
    })
}

/// Flips one bit of the signature segment.
pub fn flip_signature_bit(token: &str, bit: usize) -> String {
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let mut signature = URL_SAFE_NO_PAD.decode(&parts[2]).unwrap();
    let index = (bit / 8) % signature.len();
    signature[index] ^= 1 << (bit % 8);
    parts[2] = URL_SAFE_NO_PAD.encode(signature);
    parts.join(".")
}
