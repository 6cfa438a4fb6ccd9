//! Capability token claims.

use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Signed payload of a capability token. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityClaims {
    /// Issuer identifier
    pub iss: String,
    /// Audience identifier
    pub aud: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Unique token id (UUIDv4)
    pub jti: String,
    /// 128-bit single-use value, base64url
    pub nonce: String,
    /// Trace id echoed back by the verifier
    pub correlation_id: String,
    /// Hash of the caller's email domain
    pub requester_id: String,
    /// Capability granted
    pub scope: String,
    /// Hash binding the token to one national id
    pub pii_hash: String,
}

impl CapabilityClaims {
    /// Token lifetime in seconds.
    #[must_use]
    pub const fn ttl_seconds(&self) -> i64 {
        self.exp - self.iat
    }
}

/// Claims as decoded before validation; any member may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawClaims {
    pub(crate) iss: Option<String>,
    pub(crate) aud: Option<String>,
    pub(crate) iat: Option<i64>,
    pub(crate) exp: Option<i64>,
    pub(crate) jti: Option<String>,
    pub(crate) nonce: Option<String>,
    pub(crate) correlation_id: Option<String>,
    pub(crate) requester_id: Option<String>,
    pub(crate) scope: Option<String>,
    pub(crate) pii_hash: Option<String>,
}

impl RawClaims {
    /// Converts into complete claims, naming the missing members otherwise.
    pub(crate) fn into_complete(self) -> Result<CapabilityClaims, GateError> {
        let mut missing = Vec::new();

        let iss = present(self.iss, "iss", &mut missing);
        let aud = present(self.aud, "aud", &mut missing);
        let jti = present(self.jti, "jti", &mut missing);
        let nonce = present(self.nonce, "nonce", &mut missing);
        let correlation_id = present(self.correlation_id, "correlation_id", &mut missing);
        let requester_id = present(self.requester_id, "requester_id", &mut missing);
        let scope = present(self.scope, "scope", &mut missing);
        let pii_hash = present(self.pii_hash, "pii_hash", &mut missing);
        if self.iat.is_none() {
            missing.push("iat");
        }
        if self.exp.is_none() {
            missing.push("exp");
        }

        if !missing.is_empty() {
            return Err(GateError::malformed(format!(
                "missing claims: {}",
                missing.join(", ")
            )));
        }

        Ok(CapabilityClaims {
            iss,
            aud,
            iat: self.iat.unwrap_or_default(),
            exp: self.exp.unwrap_or_default(),
            jti,
            nonce,
            correlation_id,
            requester_id,
            scope,
            pii_hash,
        })
    }
}

fn present(value: Option<String>, name: &'static str, missing: &mut Vec<&'static str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            missing.push(name);
            String::new()
        }
    }
}
