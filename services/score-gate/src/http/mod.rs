//! HTTP surface: routes, shared state and middleware stack.

pub mod cors;
pub mod handlers;
pub mod middleware;
pub mod response;

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::keys::{resolve_signing_key, resolve_verification_keys};
use crate::observability::GateMetrics;
use crate::rate_limiter::{InMemoryRateLimiter, RateLimiter};
use crate::replay::{InMemoryReplayGuard, ReplayGuard};
use crate::scoring::{ScoreProvider, SyntheticScoreProvider};
use crate::token::{IssuerSettings, TokenIssuer, TokenVerifier, VerifierSettings};

pub use cors::CorsPolicy;
pub use response::ErrorResponse;

/// Replay and rate-limit stores shared by the handlers and the sweeper.
#[derive(Clone)]
pub struct Stores {
    /// Consumed nonces
    pub replay: Arc<dyn ReplayGuard>,
    /// Issuance windows
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl Stores {
    /// Per-process stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            replay: Arc::new(InMemoryReplayGuard::new()),
            rate_limiter: Arc::new(InMemoryRateLimiter::new()),
        }
    }
}

/// Application state shared by every request.
pub struct AppState {
    /// CORS allow-list
    pub cors: CorsPolicy,
    /// Token issuer
    pub issuer: TokenIssuer,
    /// Token verifier
    pub verifier: TokenVerifier,
    /// Score lookup
    pub scores: Arc<dyn ScoreProvider>,
    /// Prometheus metrics
    pub metrics: GateMetrics,
}

/// Shared handle to [`AppState`].
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Builds state, resolving keys through `lookup`. Key failures are kept
    /// and reported per request; construction itself never fails.
    pub fn new<L>(config: &Config, lookup: L, stores: &Stores, metrics: GateMetrics) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        Self {
            cors: CorsPolicy::new(
                config.cors_allowed_origins.clone(),
                config.cors_max_age_seconds,
            ),
            issuer: TokenIssuer::new(
                IssuerSettings::from(config),
                resolve_signing_key(&lookup),
                Arc::clone(&stores.rate_limiter),
            ),
            verifier: TokenVerifier::new(
                VerifierSettings::from(config),
                resolve_verification_keys(&lookup),
                Arc::clone(&stores.replay),
            ),
            scores: Arc::new(SyntheticScoreProvider),
            metrics,
        }
    }

    /// Replaces the score provider.
    #[must_use]
    pub fn with_score_provider(mut self, scores: Arc<dyn ScoreProvider>) -> Self {
        self.scores = scores;
        self
    }
}

/// Builds the router with CORS, correlation and tracing layers.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/token-issue",
            post(handlers::token_issue).options(handlers::preflight),
        )
        .route(
            "/score-check",
            post(handlers::score_check).options(handlers::preflight),
        )
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(from_fn_with_state(Arc::clone(&state), cors::cors_middleware))
        .layer(from_fn(middleware::correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
