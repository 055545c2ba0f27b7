//! # Canonical Serialization — JCS Byte Production
//!
//! Defines `CanonicalBytes`, the sole construction path for bytes that are
//! handed to a signer.
//!
//! ## Security Invariant
//!
//! The inner field is private. The only constructors run the value through
//! RFC 8785 (JSON Canonicalization Scheme) serialization via `serde_jcs`:
//! sorted keys, compact separators, deterministic number formatting. Two
//! semantically equal credentials therefore always sign to the same bytes,
//! no matter how their maps were ordered in memory.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - Object keys are sorted by UTF-16 code units.
/// - No insignificant whitespace.
/// - Output is valid UTF-8 JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::SerializationFailed` if the value cannot
    /// be represented as JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(&value)
    }

    /// Construct canonical bytes from an already-built JSON value.
    pub fn from_value(value: &Value) -> Result<Self, CanonicalizationError> {
        let s = serde_jcs::to_string(value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Canonical bytes of a JSON document with its top-level `proof` removed.
    ///
    /// This is the signing input for credentials: proofs never sign
    /// themselves, and adding a second proof must not change the input
    /// the first one covered.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::NotAnObject` when `document` is not a
    /// JSON object.
    pub fn signing_input(document: &Value) -> Result<Self, CanonicalizationError> {
        let mut body = document.clone();
        let obj = body
            .as_object_mut()
            .ok_or(CanonicalizationError::NotAnObject)?;
        obj.remove("proof");
        Self::from_value(&body)
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
