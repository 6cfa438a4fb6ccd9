//! Token Protocol Metrics
//!
//! Counters for issuance, rate-limit denials and verification outcomes, plus
//! a gauge of nonces held by the replay guard.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::GateError;

const NAMESPACE: &str = "score_gate";

/// Token protocol metrics
#[derive(Clone)]
pub struct GateMetrics {
    registry: Registry,
    /// Tokens issued
    pub tokens_issued: IntCounter,
    /// Issuance denials by subject
    pub rate_limited: IntCounterVec,
    /// Verification outcomes by result
    pub verifications: IntCounterVec,
    /// Nonces currently tracked
    pub tracked_nonces: IntGauge,
}

impl GateMetrics {
    /// Creates metrics on a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric fails to register.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Creates metrics on the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric fails to register.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let tokens_issued = IntCounter::with_opts(
            Opts::new("tokens_issued_total", "Total capability tokens issued").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(tokens_issued.clone()))?;

        let rate_limited = IntCounterVec::new(
            Opts::new("rate_limited_total", "Total issuance requests denied by rate limit")
                .namespace(NAMESPACE),
            &["subject"],
        )?;
        registry.register(Box::new(rate_limited.clone()))?;

        let verifications = IntCounterVec::new(
            Opts::new("verifications_total", "Total verification outcomes").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(verifications.clone()))?;

        let tracked_nonces = IntGauge::with_opts(
            Opts::new("tracked_nonces", "Consumed nonces held by the replay guard")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(tracked_nonces.clone()))?;

        Ok(Self {
            registry,
            tokens_issued,
            rate_limited,
            verifications,
            tracked_nonces,
        })
    }

    /// Records the outcome of an issuance request.
    pub fn record_issue<T>(&self, result: &Result<T, GateError>) {
        match result {
            Ok(_) => self.tokens_issued.inc(),
            Err(GateError::RateLimitExceeded { subject, .. }) => {
                self.rate_limited.with_label_values(&[subject.as_str()]).inc();
            }
            Err(_) => {}
        }
    }

    /// Records the outcome of a verification request.
    pub fn record_verification(&self, outcome: &str) {
        self.verifications.with_label_values(&[outcome]).inc();
    }

    /// Renders all metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
