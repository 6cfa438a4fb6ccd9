//! Token Verifier
//!
//! Consumes a capability token exactly once. A token is `ISSUED` until it
//! validates, then ends `CONSUMED`, `EXPIRED` or `REJECTED`; nothing moves a
//! token out of a terminal state.

use std::sync::Arc;

use rust_common::truncate_for_log;
use tracing::{info, warn};

use super::claims::CapabilityClaims;
use super::presented::{ClaimExpectations, PresentedToken};
use crate::config::{Config, DemoMode};
use crate::error::{Component, GateError};
use crate::keys::{KeyResolutionError, VerificationKeySet};
use crate::pii::{hashes_match, PiiPayload};
use crate::replay::{ReplayGuard, ReplayOutcome};

/// Bearer values with this prefix are demo tokens.
pub const DEMO_TOKEN_PREFIX: &str = "demo";

/// Verifier parameters taken from configuration.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Required `iss`
    pub issuer: String,
    /// Required `aud`
    pub audience: String,
    /// Handling of tokenless requests
    pub demo_mode: DemoMode,
}

impl From<&Config> for VerifierSettings {
    fn from(config: &Config) -> Self {
        Self {
            issuer: config.token_issuer.clone(),
            audience: config.token_audience.clone(),
            demo_mode: config.demo_mode,
        }
    }
}

/// A token that was valid and is now consumed.
#[derive(Debug, Clone)]
pub struct VerifiedCapability {
    claims: CapabilityClaims,
}

impl VerifiedCapability {
    /// Correlation id carried by the token.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.claims.correlation_id
    }

    /// Verified claims.
    #[must_use]
    pub fn claims(&self) -> &CapabilityClaims {
        &self.claims
    }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub enum Authorization {
    /// A real token was consumed
    Token(VerifiedCapability),
    /// Demo mode served a tokenless request
    Demo,
}

/// Verifies and consumes capability tokens.
pub struct TokenVerifier {
    settings: VerifierSettings,
    keys: Result<Arc<VerificationKeySet>, KeyResolutionError>,
    replay: Arc<dyn ReplayGuard>,
}

impl TokenVerifier {
    /// Creates a verifier. A failed key resolution is kept and reported per request.
    pub fn new(
        settings: VerifierSettings,
        keys: Result<VerificationKeySet, KeyResolutionError>,
        replay: Arc<dyn ReplayGuard>,
    ) -> Self {
        match &keys {
            Ok(set) => info!(keys = set.len(), "Verification keys loaded"),
            Err(err) => warn!(error = %err, "Verification keys unavailable, verification will fail"),
        }
        Self {
            settings,
            keys: keys.map(Arc::new),
            replay,
        }
    }

    /// Whether any verification key resolved.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.keys.is_ok()
    }

    /// Verifies at the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify_at`].
    pub async fn verify(
        &self,
        bearer: Option<&str>,
        pii: &PiiPayload,
    ) -> Result<Authorization, GateError> {
        self.verify_at(bearer, pii, chrono::Utc::now().timestamp())
            .await
    }

    /// Verifies `bearer` against the presented payload as of `now`.
    ///
    /// # Errors
    ///
    /// Any 401 family error for a rejected token, `InitFailure` without keys.
    pub async fn verify_at(
        &self,
        bearer: Option<&str>,
        pii: &PiiPayload,
        now: i64,
    ) -> Result<Authorization, GateError> {
        let result = self.authorize(bearer, pii, now).await;
        match &result {
            Ok(Authorization::Token(capability)) => info!(
                correlation_id = %capability.correlation_id(),
                jti = %capability.claims.jti,
                pii_hash = %truncate_for_log(&capability.claims.pii_hash),
                "Capability token consumed"
            ),
            Ok(Authorization::Demo) => info!("Demo request served"),
            Err(err) => warn!(code = err.code().as_str(), error = %err, "Capability token rejected"),
        }
        result
    }

    async fn authorize(
        &self,
        bearer: Option<&str>,
        pii: &PiiPayload,
        now: i64,
    ) -> Result<Authorization, GateError> {
        let bearer = bearer.map(str::trim).filter(|b| !b.is_empty());
        let raw = match bearer {
            Some(raw) if !raw.starts_with(DEMO_TOKEN_PREFIX) => raw,
            _ => {
                return match self.settings.demo_mode {
                    DemoMode::Enabled => Ok(Authorization::Demo),
                    DemoMode::Disabled => Err(GateError::AuthMissing),
                }
            }
        };

        let keys = self.keys.as_ref().map_err(|err| GateError::InitFailure {
            component: Component::Verifier,
            source: err.clone(),
        })?;

        let expected = ClaimExpectations {
            issuer: &self.settings.issuer,
            audience: &self.settings.audience,
        };
        let claims = PresentedToken::parse(raw)?
            .verify_signature(keys)?
            .validate_claims(expected, now)?
            .into_claims();

        // A consumed nonce is reported as a replay whatever payload came with it
        if self.replay.is_consumed(&claims.nonce).await {
            return Err(GateError::AuthReplayed);
        }

        let bound = pii
            .binding_hash()
            .is_some_and(|presented| hashes_match(&claims.pii_hash, &presented));
        if !bound {
            return Err(GateError::PayloadMismatch);
        }

        match self.replay.check_and_consume(&claims.nonce, claims.exp).await {
            ReplayOutcome::FirstUse => Ok(Authorization::Token(VerifiedCapability { claims })),
            ReplayOutcome::AlreadyUsed => Err(GateError::AuthReplayed),
        }
    }
}
