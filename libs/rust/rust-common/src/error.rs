//! Centralized error types for shared platform concerns.
//!
//! Service crates wrap [`PlatformError`] in their own error enums so that
//! failures in shared setup code surface with one shape.

use thiserror::Error;

/// Common error type for platform setup.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Tracing subscriber could not be installed
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PlatformError {
    /// Create an invalid input error with the given message.
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// let err = PlatformError::invalid_input("bad level");
    /// assert_eq!(err.to_string(), "Invalid input: bad level");
    /// ```
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::invalid_input("log level");
        assert_eq!(err.to_string(), "Invalid input: log level");

        let err = PlatformError::TracingInit("already set".to_string());
        assert_eq!(err.to_string(), "Tracing initialization failed: already set");
    }
}
