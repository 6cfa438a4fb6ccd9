//! Shared library for cross-cutting concerns in score-platform Rust services.
//!
//! This crate provides centralized implementations for:
//! - Platform error type for shared setup failures
//! - Tracing subscriber setup with optional JSON output
//! - Log-safe redaction of sensitive derived values

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod redact;
pub mod tracing_config;

pub use error::PlatformError;
pub use redact::{truncate_for_log, Redacted};
pub use tracing_config::{init_tracing, TracingConfig};
