//! # Credential Status Assignments
//!
//! The immutable record of which bits belong to a credential. Created once
//! by the allocator, never rewritten.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vcsl_core::{ListId, StatusPurpose};

/// One bit position: a list and an offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSlot {
    pub list_id: ListId,
    pub index: u64,
}

/// Bits assigned to one credential under one allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum CredentialStatusAssignment {
    /// One independently allocated slot per purpose.
    #[serde(rename_all = "camelCase")]
    Full {
        entries: BTreeMap<StatusPurpose, StatusSlot>,
    },
    /// A single index; per-purpose slots are derived from the
    /// configuration.
    #[serde(rename_all = "camelCase")]
    Terse { terse_index: u64 },
}

impl CredentialStatusAssignment {
    pub fn is_terse(&self) -> bool {
        matches!(self, Self::Terse { .. })
    }

    /// The terse index, if this is a terse assignment.
    pub fn terse_index(&self) -> Option<u64> {
        match self {
            Self::Terse { terse_index } => Some(*terse_index),
            Self::Full { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_assignment_serializes_purposes_as_keys() {
        let mut entries = BTreeMap::new();
        entries.insert(
            StatusPurpose::Revocation,
            StatusSlot {
                list_id: ListId(1),
                index: 7,
            },
        );
        let a = CredentialStatusAssignment::Full { entries };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["mode"], "full");
        assert_eq!(v["entries"]["revocation"]["listId"], 1);
        let back: CredentialStatusAssignment = serde_json::from_value(v).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn terse_assignment_exposes_index() {
        let a = CredentialStatusAssignment::Terse { terse_index: 42 };
        assert!(a.is_terse());
        assert_eq!(a.terse_index(), Some(42));
        assert_eq!(serde_json::to_value(&a).unwrap()["terseIndex"], 42);
    }
}
