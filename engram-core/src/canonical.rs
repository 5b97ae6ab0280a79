// engram-core/src/canonical.rs
// ============================================================================
// Module: I-JSON Canonicalization
// Description: RFC 8785 (JCS) canonical serialization over the I-JSON value
// model.
// Purpose: Produce a single deterministic byte string for any Engram
// entity's creation inputs so identical inputs always derive the same
// content id.
// Dependencies: serde, serde_json, serde_jcs
// ============================================================================

//! ## Overview
//! Engram ids are derived from the canonical bytes of an entity's creation
//! inputs, never from caller-supplied fields like order of insertion or
//! object key order. Canonicalization is restricted to the I-JSON value
//! model (RFC 8259 §"I-JSON Message"): null, boolean, finite number, string,
//! ordered sequence, and plain string-keyed mapping. Non-finite numbers
//! (`NaN`, `Infinity`) and anything that does not round-trip through that
//! model are rejected with [`EngramError::InvalidInput`] rather than
//! silently coerced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::EngramError;

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Serializes `value` to RFC 8785 canonical JSON bytes.
///
/// # Errors
/// Returns [`EngramError::InvalidInput`] if `value` does not serialize to
/// valid JSON, or if it contains a non-finite number anywhere in its tree.
pub fn canonical_bytes<T>(value: &T) -> Result<Vec<u8>, EngramError>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_value(value)
        .map_err(|err| EngramError::InvalidInput(format!("not representable as JSON: {err}")))?;
    validate_ijson(&json)?;
    serde_jcs::to_vec(&json)
        .map_err(|err| EngramError::InvalidInput(format!("canonicalization failed: {err}")))
}

/// Convenience wrapper that canonicalizes `value` and returns it as a UTF-8
/// string rather than raw bytes.
///
/// # Errors
/// See [`canonical_bytes`].
pub fn canonical_string<T>(value: &T) -> Result<String, EngramError>
where
    T: Serialize + ?Sized,
{
    let bytes = canonical_bytes(value)?;
    String::from_utf8(bytes)
        .map_err(|err| EngramError::InvalidInput(format!("canonical bytes were not utf-8: {err}")))
}

/// Walks a [`Value`] tree and rejects anything outside the I-JSON model.
///
/// `serde_json::Value` cannot represent dates, byte buffers, or other
/// tagged types directly, so the only realistic violation for Rust-native
/// callers is a non-finite floating point number smuggled in via
/// `serde_json::Number::from_f64`-adjacent paths.
fn validate_ijson(value: &Value) -> Result<(), EngramError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(number) => {
            if number.as_f64().is_some_and(f64::is_finite) {
                Ok(())
            } else {
                Err(EngramError::InvalidInput(format!(
                    "non-finite number is not valid I-JSON: {number}"
                )))
            }
        }
        Value::Array(items) => items.iter().try_for_each(validate_ijson),
        Value::Object(fields) => fields.values().try_for_each(validate_ijson),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use proptest::arbitrary::any;
    use proptest::collection;
    use proptest::prop_assert_eq;
    use proptest::prop_oneof;
    use proptest::proptest;
    use proptest::strategy::Just;
    use proptest::strategy::Strategy;
    use serde_json::json;

    use super::*;

    #[test]
    fn key_order_does_not_affect_canonical_bytes() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn array_order_is_preserved() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let a = json!({"outer": {"z": 1, "y": 2}});
        let b = json!({"outer": {"y": 2, "z": 1}});
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    /// `serde_json::Number` cannot hold `NaN`/`Infinity` (its own
    /// constructors reject them), so the only way to drive a non-finite
    /// value into [`canonical_bytes`] is a hand-written [`Serialize`] impl
    /// that calls `serialize_f64` directly.
    struct NonFiniteNumber;

    impl Serialize for NonFiniteNumber {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_f64(f64::NAN)
        }
    }

    #[test]
    fn non_finite_number_is_rejected() {
        assert!(matches!(canonical_bytes(&NonFiniteNumber).unwrap_err(), EngramError::InvalidInput(_)));
    }

    #[test]
    fn canonical_string_round_trips_through_utf8() {
        let value = json!({"text": "caf\u{e9}"});
        let rendered = canonical_string(&value).unwrap();
        assert!(rendered.contains("text"));
    }

    /// A bounded-depth I-JSON leaf or container, for property tests below.
    fn arb_ijson() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 5, |inner| {
            prop_oneof![
                collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                collection::hash_map("[a-z]{1,6}", inner, 0..5).prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// Reverses every object's key insertion order, recursively, without
    /// changing the logical value tree.
    fn reorder_object_keys(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(String, Value)> = map.into_iter().map(|(key, inner)| (key, reorder_object_keys(inner))).collect();
                entries.reverse();
                Value::Object(entries.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.into_iter().map(reorder_object_keys).collect()),
            other => other,
        }
    }

    proptest! {
        #[test]
        fn canonical_bytes_are_insensitive_to_object_key_order(value in arb_ijson()) {
            let reordered = reorder_object_keys(value.clone());
            let original_bytes = canonical_bytes(&value).unwrap();
            let reordered_bytes = canonical_bytes(&reordered).unwrap();
            prop_assert_eq!(original_bytes, reordered_bytes);
        }

        #[test]
        fn canonical_bytes_are_deterministic_across_repeated_calls(value in arb_ijson()) {
            prop_assert_eq!(canonical_bytes(&value).unwrap(), canonical_bytes(&value).unwrap());
        }
    }
}
