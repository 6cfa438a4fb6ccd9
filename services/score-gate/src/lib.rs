//! Score Gate Service - single-use capability tokens for the score lookup.
//!
//! An issuer mints short-lived EdDSA tokens bound to a hash of the caller's
//! PII; a verifier consumes each token exactly once before the score lookup
//! runs. Both sides are exposed over HTTP with CORS, rate limiting and
//! replay protection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod correlation;
pub mod error;
pub mod http;
pub mod keys;
pub mod observability;
pub mod pii;
pub mod rate_limiter;
pub mod replay;
pub mod scoring;
pub mod shutdown;
pub mod sweeper;
pub mod token;

pub use config::Config;
pub use error::{ErrorCode, GateError};
pub use http::{create_router, AppState, SharedState, Stores};
