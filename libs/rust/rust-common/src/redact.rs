//! Log-safe rendering of sensitive derived values.
//!
//! Hashes of personal data and key identifiers are useful for correlating
//! log lines, but the full values must never reach a log sink or an error
//! body. Only a short prefix is ever rendered.

use std::fmt;

use serde::Deserialize;

/// Number of characters kept by [`truncate_for_log`].
pub const LOG_PREFIX_LEN: usize = 8;

/// Returns at most the first [`LOG_PREFIX_LEN`] characters of `value`.
#[must_use]
pub fn truncate_for_log(value: &str) -> &str {
    match value.char_indices().nth(LOG_PREFIX_LEN) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Wrapper whose `Debug` and `Display` never show the inner value.
///
/// ```
/// use rust_common::Redacted;
///
/// let secret = Redacted::new(vec![1u8, 2, 3]);
/// assert_eq!(format!("{secret:?}"), "[REDACTED]");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    /// Wrap a value.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Access the wrapped value.
    pub const fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncate_short_value_unchanged() {
        assert_eq!(truncate_for_log("abc"), "abc");
    }

    #[test]
    fn test_truncate_long_value() {
        assert_eq!(truncate_for_log("0123456789abcdef"), "01234567");
    }

    #[test]
    fn test_redacted_display() {
        let value = Redacted::new("private".to_string());
        assert_eq!(value.to_string(), "[REDACTED]");
        assert_eq!(value.expose(), "private");
    }

    #[test]
    fn test_redacted_deserializes_transparently() {
        let value: Redacted<String> = serde_json::from_str("\"12345\"").unwrap();
        assert_eq!(value.expose(), "12345");
        assert_eq!(format!("{value:?}"), "[REDACTED]");
    }

    proptest! {
        #[test]
        fn prop_truncate_is_prefix(value in "\\PC{0,64}") {
            let truncated = truncate_for_log(&value);
            prop_assert!(value.starts_with(truncated));
            prop_assert!(truncated.chars().count() <= LOG_PREFIX_LEN);
        }
    }
}
