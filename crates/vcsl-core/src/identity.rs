//! # Identifier Newtypes
//!
//! Newtype wrappers for the identifiers the engine passes around. You
//! cannot hand an `AllocatorName` to something expecting a `CredentialId`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatusError;
use crate::purpose::StatusPurpose;

/// Name of an index allocator (the `indexAllocator` reference id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocatorName(String);

impl AllocatorName {
    /// Create a validated allocator name. Must be non-empty after trimming.
    pub fn new(name: impl Into<String>) -> Result<Self, StatusError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StatusError::validation("indexAllocator must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Access the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AllocatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential identifier used as the idempotency key for allocation and
/// the duplicate-detection key for issuance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    /// Create a validated credential id. Must be non-empty.
    pub fn new(id: impl Into<String>) -> Result<Self, StatusError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(StatusError::validation("credential id must not be empty"));
        }
        Ok(Self(id))
    }

    /// Generate a fresh `urn:uuid:` identifier.
    pub fn generate(uuid: impl fmt::Display) -> Self {
        Self(format!("urn:uuid:{uuid}"))
    }

    /// Access the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one status list (shard) within an allocator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ListId(pub u64);

impl ListId {
    /// The raw numeric id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of one shard: `(allocatorName, purpose, listId)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardKey {
    pub allocator: AllocatorName,
    pub purpose: StatusPurpose,
    pub list_id: ListId,
}

impl ShardKey {
    pub fn new(allocator: AllocatorName, purpose: StatusPurpose, list_id: ListId) -> Self {
        Self {
            allocator,
            purpose,
            list_id,
        }
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.allocator, self.purpose, self.list_id)
    }
}
