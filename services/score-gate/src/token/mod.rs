//! Capability token issuance and verification.

pub mod claims;
pub mod issuer;
pub mod presented;
pub mod verifier;

pub use claims::CapabilityClaims;
pub use issuer::{IssuedToken, IssuerSettings, TokenIssuer};
pub use presented::{ClaimExpectations, PresentedToken, SignatureValidated, Unvalidated, Validated};
pub use verifier::{
    Authorization, TokenVerifier, VerifiedCapability, VerifierSettings, DEMO_TOKEN_PREFIX,
};
