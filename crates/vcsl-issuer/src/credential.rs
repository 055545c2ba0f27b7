//! # Credential Shape Validation
//!
//! Checks an unsigned credential before anything is allocated or stored.
//!
//! The first `@context` entry selects the data model:
//!
//! | Context                                   | Model  | Required dates  |
//! |-------------------------------------------|--------|-----------------|
//! | `https://www.w3.org/2018/credentials/v1`  | VC 1.x | `issuanceDate`  |
//! | `https://www.w3.org/ns/credentials/v2`    | VC 2.x | none            |
//!
//! The credential body is otherwise left alone: `credentialSubject` is
//! open-ended and passes through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vcsl_core::StatusError;
use vcsl_status::CREDENTIALS_V2_CONTEXT;

/// VC Data Model 1.1 base context.
pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Context defining `StatusList2021Entry` for VC 1.x credentials.
pub const STATUS_LIST_2021_CONTEXT: &str = "https://w3id.org/vc/status-list/2021/v1";

/// Data model version of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VcVersion {
    V1,
    V2,
}

/// JSON-LD `@context`: a single string or an array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum ContextValue {
    Single(String),
    Array(Vec<Value>),
}

impl ContextValue {
    fn first(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            Self::Array(items) => items.first().and_then(Value::as_str),
        }
    }
}

/// Credential `type`: a single string or an array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum CredentialTypeValue {
    Single(String),
    Array(Vec<String>),
}

impl CredentialTypeValue {
    fn contains_vc_type(&self) -> bool {
        match self {
            Self::Single(s) => s == "VerifiableCredential",
            Self::Array(arr) => arr.iter().any(|s| s == "VerifiableCredential"),
        }
    }
}

/// Validate an unsigned credential and fill in a missing `issuer`.
///
/// `status_configured` is true when a `credentialStatus` will be embedded;
/// a caller-supplied one is then refused.
///
/// # Errors
///
/// `Validation` naming the first field that is missing or malformed.
pub fn validate_credential(
    credential: &mut Value,
    default_issuer: &str,
    status_configured: bool,
) -> Result<VcVersion, StatusError> {
    let obj = credential
        .as_object_mut()
        .ok_or_else(|| StatusError::validation("credential must be a JSON object"))?;

    let context: ContextValue = field(obj.get("@context"), "@context")?;
    let version = match context.first() {
        Some(CREDENTIALS_V1_CONTEXT) => VcVersion::V1,
        Some(CREDENTIALS_V2_CONTEXT) => VcVersion::V2,
        other => {
            return Err(StatusError::validation(format!(
                "first @context entry must be {CREDENTIALS_V1_CONTEXT:?} or \
                 {CREDENTIALS_V2_CONTEXT:?}, got {other:?}"
            )))
        }
    };

    let types: CredentialTypeValue = field(obj.get("type"), "type")?;
    if !types.contains_vc_type() {
        return Err(StatusError::validation(
            "credential type must include \"VerifiableCredential\"",
        ));
    }

    if let Some(id) = obj.get("id") {
        if !id.as_str().is_some_and(|s| !s.trim().is_empty()) {
            return Err(StatusError::validation("credential id must be a non-empty string"));
        }
    }

    match obj.get("credentialSubject") {
        Some(Value::Object(_)) => {}
        Some(Value::Array(subjects))
            if !subjects.is_empty() && subjects.iter().all(Value::is_object) => {}
        _ => {
            return Err(StatusError::validation(
                "credentialSubject must be an object or a non-empty array of objects",
            ))
        }
    }

    let issuer_missing = match obj.get("issuer") {
        None => true,
        Some(Value::String(s)) if !s.is_empty() => false,
        Some(Value::Object(o)) if o.get("id").and_then(Value::as_str).is_some() => false,
        Some(_) => {
            return Err(StatusError::validation(
                "issuer must be a string or an object with a string id",
            ))
        }
    };
    if issuer_missing {
        obj.insert("issuer".into(), Value::String(default_issuer.to_string()));
    }

    match version {
        VcVersion::V1 => {
            timestamp(obj.get("issuanceDate"), "issuanceDate")?.ok_or_else(|| {
                StatusError::validation("VC 1.x credentials require issuanceDate")
            })?;
            timestamp(obj.get("expirationDate"), "expirationDate")?;
        }
        VcVersion::V2 => {
            let from = timestamp(obj.get("validFrom"), "validFrom")?;
            let until = timestamp(obj.get("validUntil"), "validUntil")?;
            if let (Some(from), Some(until)) = (from, until) {
                if until < from {
                    return Err(StatusError::validation("validUntil precedes validFrom"));
                }
            }
        }
    }

    if obj.contains_key("proof") {
        return Err(StatusError::validation("credential to issue must not carry a proof"));
    }
    if status_configured && obj.contains_key("credentialStatus") {
        return Err(StatusError::validation(
            "credentialStatus is assigned by the issuer and must not be supplied",
        ));
    }

    Ok(version)
}

fn field<T: for<'de> Deserialize<'de>>(value: Option<&Value>, name: &str) -> Result<T, StatusError> {
    let value = value.ok_or_else(|| StatusError::validation(format!("credential {name} is required")))?;
    serde_json::from_value(value.clone())
        .map_err(|_| StatusError::validation(format!("credential {name} is malformed")))
}

fn timestamp(value: Option<&Value>, name: &str) -> Result<Option<DateTime<Utc>>, StatusError> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .ok_or_else(|| StatusError::validation(format!("{name} must be an RFC 3339 timestamp")))
}

/// Ensure `context` appears in the credential's `@context`.
pub fn ensure_context(credential: &mut Value, context: &str) {
    let Some(obj) = credential.as_object_mut() else {
        return;
    };
    match obj.get_mut("@context") {
        Some(Value::Array(items)) => {
            if !items.iter().any(|c| c.as_str() == Some(context)) {
                items.push(Value::String(context.to_string()));
            }
        }
        Some(Value::String(single)) => {
            if single.as_str() != context {
                let first = Value::String(std::mem::take(single));
                obj.insert(
                    "@context".into(),
                    Value::Array(vec![first, Value::String(context.to_string())]),
                );
            }
        }
        _ => {}
    }
}
