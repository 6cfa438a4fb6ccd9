//! Observability Module
//!
//! Prometheus metrics for issuance and verification. Logging goes through
//! `tracing`, initialised by `rust_common::init_tracing`.

pub mod metrics;

pub use metrics::GateMetrics;
