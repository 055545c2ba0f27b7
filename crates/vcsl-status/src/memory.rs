//! # In-Memory Status Store
//!
//! [`StatusStore`] backed by process memory.
//!
//! All locking is synchronous (`parking_lot`, not `tokio::sync`) because no
//! lock is ever held across an `.await`. Allocator records live behind one
//! mutex so the cursor check, the cursor write, the assignment insert and
//! the shard creation of a commit happen as one step. Shards live in a
//! `DashMap` so bit writes on different shards never contend.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use vcsl_core::{AllocatorName, CredentialId, ShardKey, StatusError};

use crate::assignment::CredentialStatusAssignment;
use crate::bitstring::Bitstring;
use crate::store::{AllocationCommit, AllocatorCursor, CommitOutcome, StatusStore, Versioned};

#[derive(Debug, Default)]
struct AllocatorRecord {
    cursor: AllocatorCursor,
    version: u64,
    assignments: HashMap<CredentialId, CredentialStatusAssignment>,
}

#[derive(Debug)]
struct ShardRecord {
    bits: Bitstring,
    version: u64,
}

/// Process-local [`StatusStore`].
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    allocators: Mutex<HashMap<AllocatorName, AllocatorRecord>>,
    shards: DashMap<ShardKey, ShardRecord>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shards ever created.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn load_allocator(
        &self,
        allocator: &AllocatorName,
    ) -> Result<Versioned<AllocatorCursor>, StatusError> {
        let guard = self.allocators.lock();
        Ok(guard.get(allocator).map_or_else(
            || Versioned {
                value: AllocatorCursor::default(),
                version: 0,
            },
            |record| Versioned {
                value: record.cursor.clone(),
                version: record.version,
            },
        ))
    }

    async fn commit_allocation(
        &self,
        commit: AllocationCommit,
    ) -> Result<CommitOutcome, StatusError> {
        let mut initial = Vec::with_capacity(commit.new_shards.len());
        for _ in &commit.new_shards {
            initial.push(Bitstring::zeroed(commit.capacity)?);
        }

        let mut guard = self.allocators.lock();
        let record = guard.entry(commit.allocator.clone()).or_default();
        if let Some(existing) = record.assignments.get(&commit.credential_id) {
            return Ok(CommitOutcome::Existing(existing.clone()));
        }
        if record.version != commit.expected_version {
            return Err(StatusError::conflict(
                format!("allocator {}", commit.allocator),
                commit.expected_version,
                record.version,
            ));
        }
        record.cursor = commit.cursor;
        record.version += 1;
        record
            .assignments
            .insert(commit.credential_id, commit.assignment);
        for (key, bits) in commit.new_shards.into_iter().zip(initial) {
            self.shards
                .entry(key)
                .or_insert(ShardRecord { bits, version: 0 });
        }
        Ok(CommitOutcome::Committed {
            version: record.version,
        })
    }

    async fn find_assignment(
        &self,
        allocator: &AllocatorName,
        credential_id: &CredentialId,
    ) -> Result<Option<CredentialStatusAssignment>, StatusError> {
        let guard = self.allocators.lock();
        Ok(guard
            .get(allocator)
            .and_then(|record| record.assignments.get(credential_id).cloned()))
    }

    async fn get_shard(
        &self,
        key: &ShardKey,
        capacity: u64,
    ) -> Result<Versioned<Bitstring>, StatusError> {
        if let Some(record) = self.shards.get(key) {
            return Ok(Versioned {
                value: record.bits.clone(),
                version: record.version,
            });
        }
        let bits = Bitstring::zeroed(capacity)?;
        let record = self
            .shards
            .entry(key.clone())
            .or_insert(ShardRecord { bits, version: 0 });
        Ok(Versioned {
            value: record.bits.clone(),
            version: record.version,
        })
    }

    async fn shard_version(&self, key: &ShardKey) -> Result<Option<u64>, StatusError> {
        Ok(self.shards.get(key).map(|record| record.version))
    }

    async fn set_bit(
        &self,
        key: &ShardKey,
        offset: u64,
        value: bool,
        expected_version: u64,
    ) -> Result<u64, StatusError> {
        let mut record = self
            .shards
            .get_mut(key)
            .ok_or_else(|| StatusError::NotFound(format!("status list {key}")))?;
        if record.version != expected_version {
            return Err(StatusError::conflict(
                format!("status list {key}"),
                expected_version,
                record.version,
            ));
        }
        record.bits.set(offset, value)?;
        record.version += 1;
        Ok(record.version)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use vcsl_core::{ListId, StatusPurpose};

    use super::*;
    use crate::assignment::StatusSlot;
    use crate::store::OpenShard;

    fn name() -> AllocatorName {
        AllocatorName::new("main").unwrap()
    }

    fn key(list: u64) -> ShardKey {
        ShardKey::new(name(), StatusPurpose::Revocation, ListId(list))
    }

    fn commit(credential: &str, expected_version: u64) -> AllocationCommit {
        let mut cursor = AllocatorCursor {
            next_list_id: 1,
            ..AllocatorCursor::default()
        };
        cursor.open.insert(
            StatusPurpose::Revocation,
            OpenShard {
                list_id: ListId(0),
                next_offset: expected_version + 1,
            },
        );
        let mut entries = BTreeMap::new();
        entries.insert(
            StatusPurpose::Revocation,
            StatusSlot {
                list_id: ListId(0),
                index: expected_version,
            },
        );
        AllocationCommit {
            allocator: name(),
            expected_version,
            cursor,
            credential_id: CredentialId::new(credential).unwrap(),
            assignment: CredentialStatusAssignment::Full { entries },
            new_shards: if expected_version == 0 { vec![key(0)] } else { vec![] },
            capacity: 8,
        }
    }

    #[tokio::test]
    async fn unknown_shard_is_created_zeroed_at_version_zero() {
        let store = MemoryStatusStore::new();
        assert_eq!(store.shard_version(&key(3)).await.unwrap(), None);
        let shard = store.get_shard(&key(3), 16).await.unwrap();
        assert_eq!(shard.version, 0);
        assert_eq!(shard.value.len(), 16);
        assert_eq!(shard.value.count_ones(), 0);
        assert_eq!(store.shard_version(&key(3)).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn set_bit_bumps_version_even_when_unchanged() {
        let store = MemoryStatusStore::new();
        store.get_shard(&key(0), 8).await.unwrap();
        assert_eq!(store.set_bit(&key(0), 2, false, 0).await.unwrap(), 1);
        assert_eq!(store.set_bit(&key(0), 2, true, 1).await.unwrap(), 2);
        let shard = store.get_shard(&key(0), 8).await.unwrap();
        assert!(shard.value.get(2).unwrap());
        assert_eq!(shard.version, 2);
    }

    #[tokio::test]
    async fn stale_set_bit_conflicts_and_leaves_shard_untouched() {
        let store = MemoryStatusStore::new();
        store.get_shard(&key(0), 8).await.unwrap();
        store.set_bit(&key(0), 1, true, 0).await.unwrap();
        let err = store.set_bit(&key(0), 5, true, 0).await.unwrap_err();
        assert!(err.is_conflict());
        let shard = store.get_shard(&key(0), 8).await.unwrap();
        assert_eq!(shard.version, 1);
        assert!(!shard.value.get(5).unwrap());
    }

    #[tokio::test]
    async fn set_bit_on_missing_shard_is_not_found() {
        let store = MemoryStatusStore::new();
        let err = store.set_bit(&key(9), 0, true, 0).await.unwrap_err();
        assert!(matches!(err, StatusError::NotFound(_)));
    }

    #[tokio::test]
    async fn commit_checks_cursor_version() {
        let store = MemoryStatusStore::new();
        let outcome = store.commit_allocation(commit("urn:a", 0)).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { version: 1 });
        assert_eq!(store.shard_version(&key(0)).await.unwrap(), Some(0));

        let err = store.commit_allocation(commit("urn:b", 0)).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store
            .find_assignment(&name(), &CredentialId::new("urn:b").unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn commit_for_assigned_credential_returns_existing() {
        let store = MemoryStatusStore::new();
        store.commit_allocation(commit("urn:a", 0)).await.unwrap();
        let first = store
            .find_assignment(&name(), &CredentialId::new("urn:a").unwrap())
            .await
            .unwrap()
            .unwrap();
        let outcome = store.commit_allocation(commit("urn:a", 1)).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Existing(first));
        assert_eq!(store.load_allocator(&name()).await.unwrap().version, 1);
    }
}
