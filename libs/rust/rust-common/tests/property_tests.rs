//! Property-based tests for rust-common crate.
//!
//! These tests verify universal properties across all inputs using proptest.

use proptest::prelude::*;
use rust_common::{truncate_for_log, Redacted};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Neither formatting path of `Redacted` leaks the wrapped value.
    #[test]
    fn prop_redacted_never_renders_value(secret in "[a-zA-Z0-9]{12,40}") {
        let wrapped = Redacted::new(secret.clone());

        let debug = format!("{wrapped:?}");
        let display = wrapped.to_string();
        let nested = format!("{:?}", Some(&wrapped));

        for rendered in [debug, display, nested] {
            prop_assert!(!rendered.contains(&secret));
        }
        prop_assert_eq!(wrapped.expose(), &secret);
    }

    /// Truncated log values never exceed the prefix length.
    #[test]
    fn prop_truncated_hash_is_short_prefix(hash in "[0-9a-f]{64}") {
        let shown = truncate_for_log(&hash);
        prop_assert_eq!(shown.len(), 8);
        prop_assert!(hash.starts_with(shown));
    }
}
