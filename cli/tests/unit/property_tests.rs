//! Property-based tests for target resolution and property parsing.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use proptest::prelude::*;

use pushrun_cli::domain::config::ConnectionConfig;
use pushrun_cli::domain::properties::parse_properties;
use pushrun_cli::domain::target::resolve_targets;
use pushrun_cli::domain::{ResolutionError, ValidationError};

fn hosts(spec: &str, max: usize) -> Result<Vec<String>, ResolutionError> {
    resolve_targets(spec, &ConnectionConfig::default(), max)
        .map(|targets| targets.into_iter().map(|t| t.host).collect())
}

// ============================================================================
// Range expansion
// ============================================================================

proptest! {
    /// A numeric range expands to end - start + 1 hosts, in ascending order.
    #[test]
    fn prop_numeric_range_count_and_order(start in 0u32..50, len in 0u32..20) {
        let end = start + len;
        let got = hosts(&format!("node[{start}:{end}]"), 1000).expect("valid range");
        let expected: Vec<String> = (start..=end).map(|n| format!("node{n}")).collect();
        prop_assert_eq!(got, expected);
    }

    /// Two ranges expand to the product of their sizes, first range outermost.
    #[test]
    fn prop_two_ranges_expand_to_cartesian_product(a in 1u32..6, b in 1u32..6) {
        let got = hosts(&format!("r[1:{a}]n[1:{b}]"), 1000).expect("valid ranges");
        prop_assert_eq!(got.len(), (a * b) as usize);
        prop_assert_eq!(got.first().map(String::as_str), Some("r1n1"));
        prop_assert_eq!(got.last().cloned(), Some(format!("r{a}n{b}")));
    }

    /// Expanding past the maximum is an error, never a truncated list.
    #[test]
    fn prop_expansion_beyond_max_is_rejected(count in 2u32..60, max in 1usize..40) {
        let result = hosts(&format!("h[1:{count}]"), max);
        if count as usize > max {
            prop_assert_eq!(
                result,
                Err(ResolutionError::TooManyTargets { count: count as usize, max })
            );
        } else {
            prop_assert_eq!(result.expect("within limit").len(), count as usize);
        }
    }

    /// Zero-padded ranges keep the width of the start value.
    #[test]
    fn prop_zero_padding_is_preserved(end in 10u32..99) {
        let got = hosts(&format!("web[01:{end}]"), 1000).expect("valid range");
        prop_assert!(got.iter().all(|h| h.len() == "web".len() + 2), "{:?}", got);
    }
}

// ============================================================================
// Property parsing
// ============================================================================

proptest! {
    /// Any argument without '=' is rejected and named in the error.
    #[test]
    fn prop_property_without_equals_is_malformed(arg in "[a-z_]{1,12}") {
        let err = parse_properties(std::slice::from_ref(&arg)).expect_err("no '=' present");
        prop_assert_eq!(err, ValidationError::MalformedProperty(arg));
    }

    /// Only the first '=' separates key from value.
    #[test]
    fn prop_value_may_contain_equals(key in "[a-z_]{1,8}", value in "[a-z0-9=]{0,12}") {
        let parsed = parse_properties(&[format!("{key}={value}")]).expect("valid property");
        prop_assert!(parsed.contains_key(&key));
    }
}
