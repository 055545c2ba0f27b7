//! # Status List Store
//!
//! Versioned storage for the two mutable shared resources of the engine:
//! allocator cursor records and shard bit arrays. Both are mutated only
//! through compare-and-set operations that fail with
//! [`StatusError::Conflict`] when the version moved since it was read.
//!
//! ## Version Invariant
//!
//! Every successful [`StatusStore::set_bit`] increments the shard version,
//! even when the bit already held the requested value. The publisher relies
//! on "version unchanged" meaning "bits unchanged".

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vcsl_core::{AllocatorName, CredentialId, ListId, ShardKey, StatusError, StatusPurpose};

use crate::assignment::CredentialStatusAssignment;
use crate::bitstring::Bitstring;

/// A value read together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// The list currently receiving new slots for one purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShard {
    pub list_id: ListId,
    pub next_offset: u64,
}

/// Allocator cursor record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatorCursor {
    /// The id the next opened list will receive.
    pub next_list_id: u64,
    /// Open list per purpose (full mode).
    pub open: BTreeMap<StatusPurpose, OpenShard>,
    /// Next unused terse index (terse mode).
    pub next_terse_index: u64,
}

/// Everything one allocation writes, applied atomically.
#[derive(Debug, Clone)]
pub struct AllocationCommit {
    pub allocator: AllocatorName,
    /// Cursor version the allocation was computed against.
    pub expected_version: u64,
    pub cursor: AllocatorCursor,
    pub credential_id: CredentialId,
    pub assignment: CredentialStatusAssignment,
    /// Shards opened by this allocation, created all-zero at version 0.
    pub new_shards: Vec<ShardKey>,
    /// Bits per shard.
    pub capacity: u64,
}

/// Result of [`StatusStore::commit_allocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The commit applied; the cursor is now at `version`.
    Committed { version: u64 },
    /// The credential already had an assignment; nothing was written.
    Existing(CredentialStatusAssignment),
}

/// Versioned compare-and-set storage for cursors, assignments and shards.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Read an allocator cursor. Unknown allocators read as an empty cursor
    /// at version 0.
    async fn load_allocator(
        &self,
        allocator: &AllocatorName,
    ) -> Result<Versioned<AllocatorCursor>, StatusError>;

    /// Apply an allocation if the cursor is still at `expected_version`.
    ///
    /// An existing assignment for the credential wins over a version check:
    /// the caller receives it as [`CommitOutcome::Existing`].
    async fn commit_allocation(
        &self,
        commit: AllocationCommit,
    ) -> Result<CommitOutcome, StatusError>;

    async fn find_assignment(
        &self,
        allocator: &AllocatorName,
        credential_id: &CredentialId,
    ) -> Result<Option<CredentialStatusAssignment>, StatusError>;

    /// Read a shard, creating it all-zero at version 0 if absent.
    async fn get_shard(
        &self,
        key: &ShardKey,
        capacity: u64,
    ) -> Result<Versioned<Bitstring>, StatusError>;

    /// Current version of a shard, or `None` if it was never created.
    async fn shard_version(&self, key: &ShardKey) -> Result<Option<u64>, StatusError>;

    /// Set one bit if the shard is still at `expected_version`. Returns the
    /// new version.
    async fn set_bit(
        &self,
        key: &ShardKey,
        offset: u64,
        value: bool,
        expected_version: u64,
    ) -> Result<u64, StatusError>;
}
