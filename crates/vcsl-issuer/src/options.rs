//! # Issue Options
//!
//! The `options` object of an issue request, parsed once into typed form.
//!
//! | Key                 | Type                 |
//! |---------------------|----------------------|
//! | `credentialId`      | string               |
//! | `mandatoryPointers` | array of strings     |
//! | `extraInformation`  | base64url string     |
//! | `indexAllocator`    | string               |

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::{Map, Value};
use vcsl_core::{AllocatorName, CredentialId, StatusError};

/// Parsed issue options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueOptions {
    /// Overrides `credential.id` as the duplicate-detection key.
    pub credential_id: Option<CredentialId>,
    /// JSON Pointers for selective disclosure, in request order.
    pub mandatory_pointers: Vec<String>,
    /// Opaque bytes handed to the signer unmodified.
    pub extra_information: Option<Vec<u8>>,
    /// Allocator to use when several status list configurations exist.
    pub index_allocator: Option<AllocatorName>,
}

impl IssueOptions {
    /// Parse an options object. `null` or absent means no options.
    ///
    /// # Errors
    ///
    /// `Validation` for unknown keys or values of the wrong JSON type,
    /// including an `extraInformation` that is not base64url text.
    pub fn from_value(value: Option<&Value>) -> Result<Self, StatusError> {
        let obj = match value {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(obj)) => obj,
            Some(_) => return Err(StatusError::validation("options must be an object")),
        };
        if let Some(unknown) = obj.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(StatusError::validation(format!(
                "unknown issue option {unknown:?}"
            )));
        }

        let credential_id = optional_str(obj, "credentialId")?
            .map(CredentialId::new)
            .transpose()?;
        let index_allocator = optional_str(obj, "indexAllocator")?
            .map(AllocatorName::new)
            .transpose()?;

        let mandatory_pointers = match obj.get("mandatoryPointers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        StatusError::validation("mandatoryPointers must contain only strings")
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(StatusError::validation(
                    "mandatoryPointers must be an array of strings",
                ))
            }
        };

        let extra_information = match obj.get("extraInformation") {
            None | Some(Value::Null) => None,
            Some(Value::String(encoded)) => Some(
                Base64UrlUnpadded::decode_vec(encoded.trim_end_matches('=')).map_err(|_| {
                    StatusError::validation("extraInformation must be base64url encoded")
                })?,
            ),
            Some(_) => {
                return Err(StatusError::validation(
                    "extraInformation must be a base64url string",
                ))
            }
        };

        Ok(Self {
            credential_id,
            mandatory_pointers,
            extra_information,
            index_allocator,
        })
    }
}

const KNOWN_KEYS: &[&str] = &[
    "credentialId",
    "mandatoryPointers",
    "extraInformation",
    "indexAllocator",
];

fn optional_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, StatusError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(StatusError::validation(format!("{key} must be a string"))),
    }
}
