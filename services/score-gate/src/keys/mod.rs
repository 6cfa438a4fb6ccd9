//! Key material for the capability token protocol.
//!
//! The algorithm is fixed to EdDSA over Ed25519. Nothing a caller sends can
//! select a different one.

pub mod jwk;
pub mod resolver;

use thiserror::Error;

pub use jwk::{thumbprint, SigningKeyMaterial, VerifyingKeyMaterial};
pub use resolver::{
    env_lookup, issuer_sources, resolve_first, resolve_signing_key, resolve_verification_keys,
    verifier_sources, KeyEncoding, KeySource, VerificationKeySet, TRUSTED_JWKS_SOURCE,
};

/// Why a single source value was not accepted. Never carries key bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    /// Value is not base64 in any accepted alphabet
    #[error("value is not valid base64")]
    NotBase64,
    /// Value is not a JSON object of the expected shape
    #[error("value is not a JWK document")]
    NotJson,
    /// `kty` other than OKP
    #[error("unsupported key type")]
    UnsupportedKeyType,
    /// `crv` other than Ed25519
    #[error("unsupported curve")]
    UnsupportedCurve,
    /// `alg` present and not EdDSA
    #[error("key is bound to another algorithm")]
    AlgorithmMismatch,
    /// `use` present and not `sig`
    #[error("key is not a signature key")]
    WrongKeyUse,
    /// Required JWK member absent
    #[error("missing JWK member {0}")]
    MissingField(&'static str),
    /// Member decoded to the wrong number of bytes
    #[error("JWK member {0} has the wrong length")]
    WrongLength(&'static str),
    /// Public key does not decode to a curve point
    #[error("public key is not a valid Ed25519 point")]
    NotOnCurve,
    /// Private key does not match the published public key
    #[error("private key does not match public key")]
    KeyPairMismatch,
}

/// Every source in a chain was absent or rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no usable key in sources [{}]", join_attempts(.attempts))]
pub struct KeyResolutionError {
    /// Outcome per source, in the order tried
    pub attempts: Vec<SourceAttempt>,
}

/// Outcome of trying one named source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    /// Configuration name of the source
    pub source: &'static str,
    /// `None` when the source was not set
    pub rejected: Option<KeyParseError>,
}

impl std::fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.rejected {
            None => write!(f, "{}: unset", self.source),
            Some(err) => write!(f, "{}: {err}", self.source),
        }
    }
}

fn join_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
