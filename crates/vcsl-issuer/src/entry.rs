//! # Status Entries
//!
//! Renders an assignment as the `credentialStatus` claim embedded in an
//! issued credential.

use serde_json::{json, Value};
use vcsl_core::StatusError;
use vcsl_status::update::{
    BITSTRING_STATUS_LIST_ENTRY, STATUS_LIST_2021_ENTRY, TERSE_BITSTRING_STATUS_LIST_ENTRY,
};
use vcsl_status::{CredentialStatusAssignment, StatusListConfig};

use crate::credential::{ensure_context, VcVersion, STATUS_LIST_2021_CONTEXT};

/// Build the `credentialStatus` value for an assignment.
///
/// Full assignments produce one entry per configured purpose, in
/// configuration order: a single object for one purpose, an array for
/// several. Terse assignments produce one compact entry.
pub fn status_entries(
    config: &StatusListConfig,
    assignment: &CredentialStatusAssignment,
    version: VcVersion,
) -> Result<Value, StatusError> {
    if let CredentialStatusAssignment::Terse { terse_index } = assignment {
        if version == VcVersion::V1 {
            return Err(StatusError::validation(
                "terse status lists require a VC 2.x credential",
            ));
        }
        return Ok(json!({
            "type": TERSE_BITSTRING_STATUS_LIST_ENTRY,
            "terseStatusListBaseUrl": config.base_url(),
            "terseStatusListIndex": terse_index,
        }));
    }

    let entry_type = match version {
        VcVersion::V1 => STATUS_LIST_2021_ENTRY,
        VcVersion::V2 => BITSTRING_STATUS_LIST_ENTRY,
    };
    let mut entries: Vec<Value> = config
        .status_purposes()
        .iter()
        .filter_map(|purpose| {
            let slot = config.resolve_slot(assignment, purpose)?;
            let url = config.list_url(purpose, slot.list_id);
            Some(json!({
                "id": format!("{url}#{}", slot.index),
                "type": entry_type,
                "statusPurpose": purpose.as_str(),
                "statusListCredential": url,
                "statusListIndex": slot.index.to_string(),
            }))
        })
        .collect();

    match entries.len() {
        0 => Err(StatusError::InvalidState(
            "assignment holds no slot for any configured purpose".into(),
        )),
        1 => Ok(entries.remove(0)),
        _ => Ok(Value::Array(entries)),
    }
}

/// Attach `credentialStatus` to a credential.
pub fn embed_status(credential: &mut Value, entries: Value, version: VcVersion) {
    let terse = entries
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t == TERSE_BITSTRING_STATUS_LIST_ENTRY);
    if version == VcVersion::V1 && !terse {
        ensure_context(credential, STATUS_LIST_2021_CONTEXT);
    }
    if let Some(obj) = credential.as_object_mut() {
        obj.insert("credentialStatus".into(), entries);
    }
}
