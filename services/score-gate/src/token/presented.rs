//! Type-State Capability Token
//!
//! A presented token moves through `Unvalidated -> SignatureValidated ->
//! Validated`. Claims are only reachable on a `Validated` token, so nothing
//! downstream can act on a token whose signature or claims were not checked.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;

use super::claims::{CapabilityClaims, RawClaims};
use crate::config::SCORE_SCOPE;
use crate::error::{GateError, InvalidReason};
use crate::keys::VerificationKeySet;

// ============================================================================
// Sealed Trait Pattern for Token States
// ============================================================================

mod private {
    /// Sealed trait to prevent external implementations
    pub trait Sealed {}
}

/// Marker trait for token validation states
pub trait TokenState: private::Sealed {
    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Unvalidated token - header parsed, nothing verified
#[derive(Debug)]
pub struct Unvalidated;
impl private::Sealed for Unvalidated {}
impl TokenState for Unvalidated {
    fn state_name() -> &'static str {
        "Unvalidated"
    }
}

/// Signature validated - claims decoded but not yet checked
#[derive(Debug)]
pub struct SignatureValidated {
    claims: RawClaims,
}
impl private::Sealed for SignatureValidated {}
impl TokenState for SignatureValidated {
    fn state_name() -> &'static str {
        "SignatureValidated"
    }
}

/// Fully validated - signature, issuer, audience, expiry and scope verified
#[derive(Debug)]
pub struct Validated {
    claims: CapabilityClaims,
}
impl private::Sealed for Validated {}
impl TokenState for Validated {
    fn state_name() -> &'static str {
        "Validated"
    }
}

/// Claim values the verifier requires.
#[derive(Debug, Clone, Copy)]
pub struct ClaimExpectations<'a> {
    /// Required `iss`
    pub issuer: &'a str,
    /// Required `aud`
    pub audience: &'a str,
}

#[derive(Deserialize)]
struct TokenHeader {
    alg: Option<String>,
    kid: Option<String>,
}

// ============================================================================
// Type-State Token Wrapper
// ============================================================================

/// Type-state token wrapper that enforces validation at compile time
#[derive(Debug)]
pub struct PresentedToken<State: TokenState> {
    raw: String,
    kid: String,
    state: State,
}

impl PresentedToken<Unvalidated> {
    /// Parses the compact form and checks the header.
    ///
    /// The header algorithm must be EdDSA; anything else is rejected here,
    /// before a key is looked up.
    ///
    /// # Errors
    ///
    /// `AuthMalformed` for structural problems, `AuthInvalid` for a foreign algorithm.
    pub fn parse(raw: &str) -> Result<Self, GateError> {
        let raw = raw.trim();
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(GateError::malformed("token must have three segments"));
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(segments[0])
            .map_err(|_| GateError::malformed("header is not base64url"))?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes)
            .map_err(|_| GateError::malformed("header is not JSON"))?;

        if header.alg.as_deref() != Some("EdDSA") {
            return Err(GateError::invalid(InvalidReason::AlgorithmNotAllowed));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| GateError::malformed("missing kid in header"))?;

        Ok(Self {
            raw: raw.to_string(),
            kid,
            state: Unvalidated,
        })
    }

    /// Key ID from the header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Verifies the signature with the key registered for this token's `kid`.
    ///
    /// # Errors
    ///
    /// `AuthInvalid` for an unknown key or a bad signature.
    pub fn verify_signature(
        self,
        keys: &VerificationKeySet,
    ) -> Result<PresentedToken<SignatureValidated>, GateError> {
        let key = keys
            .get(&self.kid)
            .ok_or(GateError::invalid(InvalidReason::UnknownKey))?;

        // Signature only; claims are checked in the next state
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data = decode::<RawClaims>(&self.raw, key.decoding_key(), &validation)?;

        Ok(PresentedToken {
            raw: self.raw,
            kid: self.kid,
            state: SignatureValidated {
                claims: token_data.claims,
            },
        })
    }
}

impl PresentedToken<SignatureValidated> {
    /// Validates claims and transitions to the fully validated state.
    ///
    /// # Errors
    ///
    /// `AuthInvalid` on issuer, audience or scope mismatch, `AuthExpired`
    /// once `exp <= now`, `AuthMalformed` when required claims are missing.
    pub fn validate_claims(
        self,
        expected: ClaimExpectations<'_>,
        now: i64,
    ) -> Result<PresentedToken<Validated>, GateError> {
        let raw = self.state.claims;

        if raw.iss.as_deref().is_some_and(|iss| iss != expected.issuer) {
            return Err(GateError::invalid(InvalidReason::IssuerMismatch));
        }
        if raw.aud.as_deref().is_some_and(|aud| aud != expected.audience) {
            return Err(GateError::invalid(InvalidReason::AudienceMismatch));
        }

        let exp = raw
            .exp
            .ok_or_else(|| GateError::malformed("missing claims: exp"))?;
        if exp <= now {
            return Err(GateError::AuthExpired {
                expired_at: chrono::DateTime::from_timestamp(exp, 0).unwrap_or_default(),
            });
        }

        let claims = raw.into_complete()?;
        if claims.scope != SCORE_SCOPE {
            return Err(GateError::invalid(InvalidReason::ScopeMismatch));
        }

        Ok(PresentedToken {
            raw: self.raw,
            kid: self.kid,
            state: Validated { claims },
        })
    }
}

impl PresentedToken<Validated> {
    /// Access claims - only available on fully validated tokens
    #[must_use]
    pub fn claims(&self) -> &CapabilityClaims {
        &self.state.claims
    }

    /// Consumes the token, returning its claims.
    #[must_use]
    pub fn into_claims(self) -> CapabilityClaims {
        self.state.claims
    }

    /// Key ID used for verification.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

// Common methods for all states
impl<S: TokenState> PresentedToken<S> {
    /// Get the current state name
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }
}
