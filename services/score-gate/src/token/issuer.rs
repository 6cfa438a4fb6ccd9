//! Token Issuer
//!
//! Turns a validated PII payload into a short-lived, single-use capability
//! token bound to that payload's hash.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, Header};
use rand::rngs::OsRng;
use rand::RngCore;
use rust_common::truncate_for_log;
use tracing::{info, warn};
use uuid::Uuid;

use super::claims::CapabilityClaims;
use crate::config::{Config, RatePolicy, SCORE_SCOPE};
use crate::correlation::CorrelationId;
use crate::error::{Component, GateError, RateSubject};
use crate::keys::{KeyResolutionError, SigningKeyMaterial};
use crate::pii::{PiiPayload, ValidatedPii};
use crate::rate_limiter::{RateDecision, RateLimiter};

const NONCE_BYTES: usize = 16;

/// Issuer parameters taken from configuration.
#[derive(Debug, Clone)]
pub struct IssuerSettings {
    /// `iss` claim
    pub issuer: String,
    /// `aud` claim
    pub audience: String,
    /// Token lifetime
    pub ttl: Duration,
    /// Cap per PII hash
    pub pii_rate: RatePolicy,
    /// Cap per requester hash
    pub requester_rate: RatePolicy,
}

impl From<&Config> for IssuerSettings {
    fn from(config: &Config) -> Self {
        Self {
            issuer: config.token_issuer.clone(),
            audience: config.token_audience.clone(),
            ttl: config.token_ttl(),
            pii_rate: config.pii_rate,
            requester_rate: config.requester_rate,
        }
    }
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWS
    pub token: String,
    /// Seconds until expiry
    pub ttl_seconds: u64,
    /// Correlation id written into the claims
    pub correlation_id: CorrelationId,
    /// Claims as signed
    pub claims: CapabilityClaims,
}

/// Mints capability tokens.
pub struct TokenIssuer {
    settings: IssuerSettings,
    key: Result<Arc<SigningKeyMaterial>, KeyResolutionError>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl TokenIssuer {
    /// Creates an issuer. A failed key resolution is kept and reported per request.
    pub fn new(
        settings: IssuerSettings,
        key: Result<SigningKeyMaterial, KeyResolutionError>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        if let Err(err) = &key {
            warn!(error = %err, "Issuer signing key unavailable, issuance will fail");
        }
        Self {
            settings,
            key: key.map(Arc::new),
            rate_limiter,
        }
    }

    /// Whether a signing key resolved.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.key.is_ok()
    }

    /// Issues a token at the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::issue_at`].
    pub async fn issue(
        &self,
        pii: &PiiPayload,
        correlation_id: CorrelationId,
    ) -> Result<IssuedToken, GateError> {
        self.issue_at(pii, correlation_id, chrono::Utc::now().timestamp())
            .await
    }

    /// Issues a token as of `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// `Validation` for a bad payload, `RateLimitExceeded` when either
    /// subject is over its cap, `InitFailure` without a signing key.
    pub async fn issue_at(
        &self,
        pii: &PiiPayload,
        correlation_id: CorrelationId,
        now: i64,
    ) -> Result<IssuedToken, GateError> {
        let pii = pii.validate()?;
        self.enforce_rate_limits(&pii).await?;

        let nonce = generate_nonce();
        let jti = Uuid::new_v4().to_string();

        let key = self.key.as_ref().map_err(|err| GateError::InitFailure {
            component: Component::Issuer,
            source: err.clone(),
        })?;

        let ttl_seconds = self.settings.ttl.as_secs();
        let claims = CapabilityClaims {
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
            jti,
            nonce,
            correlation_id: correlation_id.to_string(),
            requester_id: pii.requester_id().to_string(),
            scope: SCORE_SCOPE.to_string(),
            pii_hash: pii.pii_hash().to_string(),
        };

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(key.kid().to_string());

        let token = encode(&header, &claims, key.encoding_key())
            .map_err(|e| GateError::Internal(anyhow::Error::new(e).context("signing token")))?;

        info!(
            correlation_id = %correlation_id,
            kid = %key.kid(),
            jti = %claims.jti,
            pii_hash = %truncate_for_log(&claims.pii_hash),
            requester = %truncate_for_log(&claims.requester_id),
            ttl_seconds,
            "Capability token issued"
        );

        Ok(IssuedToken {
            token,
            ttl_seconds,
            correlation_id,
            claims,
        })
    }

    /// Both subjects are decided together and charged only when both admit.
    /// A denial reports the subject with the longest wait.
    async fn enforce_rate_limits(&self, pii: &ValidatedPii) -> Result<(), GateError> {
        let pii_key = format!("{}:{}", RateSubject::Pii, pii.pii_hash());
        let requester_key = format!("{}:{}", RateSubject::Requester, pii.requester_id());
        let subjects = [
            (RateSubject::Pii, pii.pii_hash()),
            (RateSubject::Requester, pii.requester_id()),
        ];

        let decisions = self
            .rate_limiter
            .admit_all(&[
                (pii_key.as_str(), self.settings.pii_rate),
                (requester_key.as_str(), self.settings.requester_rate),
            ])
            .await;

        let binding = subjects
            .into_iter()
            .zip(decisions)
            .filter_map(|(subject, decision)| match decision {
                RateDecision::Denied {
                    retry_after_seconds,
                } => Some((subject, retry_after_seconds)),
                RateDecision::Admitted => None,
            })
            .max_by_key(|((_, _), retry_after_seconds)| *retry_after_seconds);

        match binding {
            Some(((subject, hash), retry_after_seconds)) => {
                info!(
                    subject = %subject,
                    hash = %truncate_for_log(hash),
                    retry_after_seconds,
                    "Issuance rate limited"
                );
                Err(GateError::RateLimitExceeded {
                    subject,
                    retry_after: Duration::from_secs(retry_after_seconds),
                })
            }
            None => Ok(()),
        }
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
