//! Error handling module with type-safe, non-exhaustive error types
//!
//! Every failure the issuer or verifier can report is one [`GateError`]
//! variant. Each variant maps to a stable [`ErrorCode`], an HTTP status and a
//! client-facing message that never carries PII, full hashes or key bytes.

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::keys::KeyResolutionError;

/// Subject a rate-limit decision was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSubject {
    /// Hash of the national id
    Pii,
    /// Hash of the caller's email domain
    Requester,
}

impl RateSubject {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pii => "pii",
            Self::Requester => "requester",
        }
    }
}

impl fmt::Display for RateSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol side that failed to resolve its key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Token issuer (signing key)
    Issuer,
    /// Token verifier (verification keys)
    Verifier,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Issuer => "issuer",
            Self::Verifier => "verifier",
        })
    }
}

/// Why a token was rejected as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Signature did not verify
    BadSignature,
    /// Header `kid` not in the resolvable key set
    UnknownKey,
    /// Header `alg` other than EdDSA
    AlgorithmNotAllowed,
    /// `iss` claim mismatch
    IssuerMismatch,
    /// `aud` claim mismatch
    AudienceMismatch,
    /// `scope` claim other than the score capability
    ScopeMismatch,
}

impl InvalidReason {
    /// Fine-grained label, for logs only.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadSignature => "bad_signature",
            Self::UnknownKey => "unknown_key",
            Self::AlgorithmNotAllowed => "algorithm_not_allowed",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::ScopeMismatch => "scope_mismatch",
        }
    }

    /// Coarse label returned to callers.
    #[must_use]
    pub const fn public_reason(&self) -> &'static str {
        match self {
            Self::BadSignature | Self::UnknownKey | Self::AlgorithmNotAllowed => {
                "signature_invalid"
            }
            Self::IssuerMismatch | Self::AudienceMismatch | Self::ScopeMismatch => {
                "claims_invalid"
            }
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-exhaustive error enum for the token protocol.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GateError {
    /// Issuance denied by the rate limiter
    #[error("Rate limit exceeded for {subject} subject")]
    RateLimitExceeded {
        /// Subject that denied
        subject: RateSubject,
        /// When the caller may retry
        retry_after: Duration,
    },

    /// PII payload missing or malformed
    #[error("Invalid request: {reason}")]
    Validation {
        /// Which field failed, never its value
        reason: String,
    },

    /// Signature, key, algorithm, issuer, audience or scope rejected
    #[error("Token rejected: {reason}")]
    AuthInvalid {
        /// Detailed reason
        reason: InvalidReason,
    },

    /// Token TTL elapsed
    #[error("Token expired at {expired_at}")]
    AuthExpired {
        /// Expiry claim of the token
        expired_at: DateTime<Utc>,
    },

    /// Nonce already consumed
    #[error("Token already consumed")]
    AuthReplayed,

    /// Token bound to a different PII payload
    #[error("Token bound to a different payload")]
    PayloadMismatch,

    /// Token structure unreadable or required claims missing
    #[error("Token malformed: {reason}")]
    AuthMalformed {
        /// Description of the malformation
        reason: String,
    },

    /// No token presented and demo mode disabled
    #[error("Capability token required")]
    AuthMissing,

    /// Key material never resolved for this component
    #[error("Key material unavailable for {component}")]
    InitFailure {
        /// Side that failed
        component: Component,
        /// Resolution detail, source names only
        #[source]
        source: KeyResolutionError,
    },

    /// Internal error (details sanitized in responses)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Issuance cap reached (429)
    RateLimitExceeded,
    /// Request payload rejected (400)
    ValidationError,
    /// Signature, key or claim check failed (401)
    AuthInvalid,
    /// Token past its `exp` (401)
    AuthExpired,
    /// Nonce already consumed (401)
    AuthReplayed,
    /// Token bound to a different payload (401)
    PayloadMismatch,
    /// Token structurally unusable (401)
    AuthMalformed,
    /// No capability token presented (401)
    AuthMissing,
    /// Key material unavailable (500)
    InitFailure,
    /// Unexpected failure (500)
    InternalError,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RateLimitExceeded",
            Self::ValidationError => "ValidationError",
            Self::AuthInvalid => "AuthInvalid",
            Self::AuthExpired => "AuthExpired",
            Self::AuthReplayed => "AuthReplayed",
            Self::PayloadMismatch => "PayloadMismatch",
            Self::AuthMalformed => "AuthMalformed",
            Self::AuthMissing => "AuthMissing",
            Self::InitFailure => "init_failed",
            Self::InternalError => "internal_error",
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::AuthInvalid
            | Self::AuthExpired
            | Self::AuthReplayed
            | Self::PayloadMismatch
            | Self::AuthMalformed
            | Self::AuthMissing => StatusCode::UNAUTHORIZED,
            Self::InitFailure | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl GateError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a malformed token.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::AuthMalformed {
            reason: reason.into(),
        }
    }

    /// Shorthand for an invalid token.
    #[must_use]
    pub const fn invalid(reason: InvalidReason) -> Self {
        Self::AuthInvalid { reason }
    }

    /// Get the error code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::AuthInvalid { .. } => ErrorCode::AuthInvalid,
            Self::AuthExpired { .. } => ErrorCode::AuthExpired,
            Self::AuthReplayed => ErrorCode::AuthReplayed,
            Self::PayloadMismatch => ErrorCode::PayloadMismatch,
            Self::AuthMalformed { .. } => ErrorCode::AuthMalformed,
            Self::AuthMissing => ErrorCode::AuthMissing,
            Self::InitFailure { .. } => ErrorCode::InitFailure,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Reason string for 401 bodies, `None` for other errors.
    #[must_use]
    pub const fn auth_reason(&self) -> Option<&'static str> {
        match self {
            Self::AuthInvalid { reason } => Some(reason.public_reason()),
            Self::AuthExpired { .. } => Some("expired"),
            Self::AuthReplayed => Some("replayed"),
            Self::PayloadMismatch => Some("payload_mismatch"),
            Self::AuthMalformed { .. } => Some("malformed"),
            Self::AuthMissing => Some("missing_token"),
            _ => None,
        }
    }

    /// Client-facing message. Never includes internal detail.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::RateLimitExceeded { .. } => "Too many token requests".to_string(),
            Self::Validation { reason } => reason.clone(),
            Self::AuthInvalid { .. } => "Token could not be verified".to_string(),
            Self::AuthExpired { .. } => "Token has expired".to_string(),
            Self::AuthReplayed => "Token has already been used".to_string(),
            Self::PayloadMismatch => "Token was issued for a different request".to_string(),
            Self::AuthMalformed { .. } => "Token is malformed".to_string(),
            Self::AuthMissing => "A capability token is required".to_string(),
            Self::InitFailure { .. } => "Service is not initialized".to_string(),
            Self::Internal(_) => "Internal error".to_string(),
        }
    }

    /// Get retry-after duration if applicable
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for GateError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::Base64(_) | ErrorKind::Crypto(_) => {
                Self::invalid(InvalidReason::BadSignature)
            }
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::invalid(InvalidReason::AlgorithmNotAllowed),
            ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat => Self::invalid(InvalidReason::UnknownKey),
            ErrorKind::Json(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
                Self::malformed("token segments could not be decoded")
            }
            _ => Self::malformed("token validation failed"),
        }
    }
}
