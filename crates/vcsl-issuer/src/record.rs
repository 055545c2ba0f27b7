//! # Issuance Records
//!
//! One record per credential id, persisted in the [`DocumentStore`].
//!
//! ```text
//!   insert            sign ok
//! ─────────► Pending ─────────► Issued
//!              │ ▲
//!      sign err│ │retry claims
//!              ▼ │
//!             Failed
//! ```
//!
//! A `Pending` record older than the claim lease is treated like `Failed`:
//! the attempt that wrote it is presumed dead and a retry may take it over.
//!
//! [`DocumentStore`]: crate::DocumentStore

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vcsl_core::{AllocatorName, CredentialId};
use vcsl_status::CredentialStatusAssignment;

/// Where an issuance attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssuanceState {
    /// Persisted, signing in flight.
    Pending,
    /// Signed and returned to the caller.
    Issued,
    /// Signing or a step before it failed.
    Failed,
}

/// Persisted state of one credential id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: CredentialId,
    pub state: IssuanceState,
    /// The credential as last persisted. Signed once `Issued`.
    pub document: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocator: Option<AllocatorName>,
    /// Status bits bound to this id. Never changes once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<CredentialStatusAssignment>,
    /// Number of issuance attempts that claimed this record.
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// A freshly claimed record.
    pub fn pending(id: CredentialId, document: Value) -> Self {
        Self {
            id,
            state: IssuanceState::Pending,
            document,
            allocator: None,
            assignment: None,
            attempts: 1,
            updated_at: Utc::now(),
        }
    }

    /// Whether a new attempt may take this record over.
    pub fn is_claimable(&self, lease: Duration, now: DateTime<Utc>) -> bool {
        match self.state {
            IssuanceState::Issued => false,
            IssuanceState::Failed => true,
            IssuanceState::Pending => self.updated_at + lease <= now,
        }
    }
}
