// engram-core/src/id.rs
// ============================================================================
// Module: Content-Addressed Identifiers
// Description: SHA-256 id derivation over canonical JSON bytes.
// Purpose: Give every Engram entity a stable, globally unique id that is a
// pure function of its creation inputs.
// Dependencies: sha2, serde, crate::canonical
// ============================================================================

//! ## Overview
//! `ContentId` is the newtype every entity id in Engram is built from:
//! sixty-four lowercase hex characters, the SHA-256 digest of the entity's
//! canonical creation-input bytes. Two calls with semantically identical
//! inputs always derive the same id, which is what makes `add` idempotent
//! across the store layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::canonical::canonical_bytes;
use crate::error::EngramError;

/// Lowercase hex alphabet used for digest rendering.
const HEX: &[u8; 16] = b"0123456789abcdef";

/// Length, in characters, of a full content id.
const FULL_LEN: usize = 64;

/// Length, in characters, of a content id's short form.
const SHORT_LEN: usize = 8;

// ============================================================================
// SECTION: ContentId
// ============================================================================

/// A SHA-256 content address, rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Derives a content id from the canonical JSON bytes of `inputs`.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if `inputs` cannot be
    /// canonicalized (see [`canonical_bytes`]).
    pub fn derive<T>(inputs: &T) -> Result<Self, EngramError>
    where
        T: Serialize + ?Sized,
    {
        let bytes = canonical_bytes(inputs)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Hashes raw bytes directly, bypassing canonicalization. Used when the
    /// caller has already produced canonical bytes (e.g. re-deriving an id
    /// from a stored audit record).
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex_encode(&digest))
    }

    /// Parses a previously derived id, validating its shape.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if `raw` is not exactly 64
    /// lowercase hex characters.
    pub fn parse(raw: &str) -> Result<Self, EngramError> {
        if raw.len() == FULL_LEN && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(EngramError::InvalidInput(format!(
                "'{raw}' is not a valid content id (expected 64 lowercase hex characters)"
            )))
        }
    }

    /// Returns the full 64-character hex id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 8 characters, used for human-facing display.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN]
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl TryFrom<String> for ContentId {
    type Error = EngramError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl TryFrom<&str> for ContentId {
    type Error = EngramError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

/// Renders `bytes` as lowercase hex without pulling in an encoding crate.
fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use proptest::arbitrary::any;
    use proptest::prop_assert_eq;
    use proptest::proptest;
    use serde_json::json;

    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = ContentId::derive(&json!({"x": 1, "y": 2})).unwrap();
        let b = ContentId::derive(&json!({"y": 2, "x": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derive_differs_on_content_change() {
        let a = ContentId::derive(&json!({"x": 1})).unwrap();
        let b = ContentId::derive(&json!({"x": 2})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(ContentId::parse("deadbeef").is_err());
    }

    #[test]
    fn parse_rejects_uppercase() {
        let id = ContentId::derive(&json!({"x": 1})).unwrap();
        let upper = id.as_str().to_uppercase();
        assert!(ContentId::parse(&upper).is_err());
    }

    proptest! {
        #[test]
        fn derive_is_deterministic_across_repeated_calls(text in "[a-z]{0,12}", n in any::<i32>()) {
            let inputs = json!({"text": text, "n": n});
            prop_assert_eq!(ContentId::derive(&inputs).unwrap(), ContentId::derive(&inputs).unwrap());
        }

        #[test]
        fn derive_ignores_object_key_order(a in "[a-z]{1,12}", b in any::<i32>()) {
            let forward = json!({"a": a, "b": b});
            let reversed = json!({"b": b, "a": a});
            prop_assert_eq!(ContentId::derive(&forward).unwrap(), ContentId::derive(&reversed).unwrap());
        }
    }

    #[test]
    fn short_is_first_eight_chars() {
        let id = ContentId::derive(&json!({"x": 1})).unwrap();
        assert_eq!(id.short(), &id.as_str()[..8]);
    }
}
