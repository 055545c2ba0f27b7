//! # Mandatory Pointer Checks
//!
//! Selective-disclosure suites take a list of JSON Pointers (RFC 6901)
//! naming the claims that are always disclosed. Every pointer must resolve
//! against the credential before anything is allocated or stored.

use serde_json::Value;
use vcsl_core::StatusError;

/// Check that each pointer resolves inside `credential`.
///
/// # Errors
///
/// `Data` carrying the first pointer that is malformed or does not resolve.
pub fn check_mandatory_pointers(credential: &Value, pointers: &[String]) -> Result<(), StatusError> {
    for pointer in pointers {
        if !pointer.starts_with('/') {
            return Err(StatusError::data(
                "mandatory pointer must start with '/'",
                pointer.as_str(),
            ));
        }
        if credential.pointer(pointer).is_none() {
            return Err(StatusError::data(
                "mandatory pointer does not resolve in the credential",
                pointer.as_str(),
            ));
        }
    }
    Ok(())
}
