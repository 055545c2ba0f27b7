//! # Index Allocator
//!
//! Assigns each credential a unique bit position per status purpose.
//!
//! ## Allocation Invariant
//!
//! For one allocator and purpose, no two credentials ever hold the same
//! `(listId, index)`. The allocator computes the next cursor from a
//! versioned read and commits cursor, assignment and any newly opened
//! shards in one compare-and-set. A writer that lost the race re-reads and
//! tries again, bounded by the [`RetryPolicy`].
//!
//! ## Idempotency
//!
//! Allocation is keyed by credential id. A credential that already holds
//! an assignment gets it back unchanged, so retried issuance never consumes
//! a second slot. An allocated slot stays bound to its credential id even
//! if that credential is never issued.
//!
//! ## List ids
//!
//! List ids start at 0. In full mode every purpose draws new lists from one
//! shared cursor, so `listCount` bounds the lists the allocator opens
//! across all purposes. In terse mode each purpose owns the fixed range
//! `ordinal × listCount ..< (ordinal + 1) × listCount`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use vcsl_core::{AllocatorName, CredentialId, ListId, ShardKey, StatusError, StatusPurpose};

use crate::assignment::{CredentialStatusAssignment, StatusSlot};
use crate::config::StatusListConfig;
use crate::retry::RetryPolicy;
use crate::store::{AllocationCommit, AllocatorCursor, CommitOutcome, OpenShard, StatusStore};

/// Cursor changes computed for one allocation, not yet committed.
struct Plan {
    assignment: CredentialStatusAssignment,
    new_shards: Vec<ShardKey>,
    rollovers: u64,
}

/// Named allocation policy owned by one status list configuration.
pub struct IndexAllocator {
    config: StatusListConfig,
    store: Arc<dyn StatusStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for IndexAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexAllocator")
            .field("name", self.name())
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl IndexAllocator {
    /// Build an allocator for a validated configuration.
    pub fn new(
        config: StatusListConfig,
        store: Arc<dyn StatusStore>,
        retry: RetryPolicy,
    ) -> Result<Self, StatusError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            retry,
        })
    }

    pub fn name(&self) -> &AllocatorName {
        self.config.index_allocator()
    }

    pub fn config(&self) -> &StatusListConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// The assignment recorded for a credential, if any.
    pub async fn assignment(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<CredentialStatusAssignment>, StatusError> {
        self.store.find_assignment(self.name(), credential_id).await
    }

    /// Assign slots for `purposes` to `credential_id`.
    ///
    /// Returns the existing assignment if the credential already has one.
    ///
    /// # Errors
    ///
    /// - `Validation` if `purposes` is empty, repeats a purpose, or names
    ///   one this allocator is not configured for.
    /// - `QuotaExceeded` if a new list is needed and `listCount` lists are
    ///   already open. Nothing is recorded.
    /// - `Contention` if the compare-and-set kept losing.
    pub async fn allocate(
        &self,
        credential_id: &CredentialId,
        purposes: &[StatusPurpose],
    ) -> Result<CredentialStatusAssignment, StatusError> {
        self.check_purposes(purposes)?;
        let resource = format!("allocator {}", self.name());
        self.retry
            .run(&resource, move |_| self.try_allocate(credential_id, purposes))
            .await
    }

    fn check_purposes(&self, purposes: &[StatusPurpose]) -> Result<(), StatusError> {
        if purposes.is_empty() {
            return Err(StatusError::validation("at least one status purpose is required"));
        }
        let mut seen = BTreeSet::new();
        for purpose in purposes {
            if self.config.ordinal(purpose).is_none() {
                return Err(StatusError::validation(format!(
                    "allocator {:?} is not configured for purpose {purpose}",
                    self.name().as_str()
                )));
            }
            if !seen.insert(purpose) {
                return Err(StatusError::validation(format!(
                    "status purpose {purpose} requested twice"
                )));
            }
        }
        Ok(())
    }

    async fn try_allocate(
        &self,
        credential_id: &CredentialId,
        purposes: &[StatusPurpose],
    ) -> Result<CredentialStatusAssignment, StatusError> {
        if let Some(existing) = self.assignment(credential_id).await? {
            tracing::debug!(
                allocator = %self.name(),
                credential_id = %credential_id,
                "credential already holds an assignment"
            );
            return Ok(existing);
        }

        let current = self.store.load_allocator(self.name()).await?;
        let mut cursor = current.value;
        let plan = if self.config.is_terse() {
            self.plan_terse(&mut cursor)?
        } else {
            self.plan_full(&mut cursor, purposes)?
        };

        let commit = AllocationCommit {
            allocator: self.name().clone(),
            expected_version: current.version,
            cursor,
            credential_id: credential_id.clone(),
            assignment: plan.assignment.clone(),
            new_shards: plan.new_shards.clone(),
            capacity: self.config.capacity(),
        };
        match self.store.commit_allocation(commit).await? {
            CommitOutcome::Committed { version } => {
                self.record(credential_id, &plan, version);
                Ok(plan.assignment)
            }
            CommitOutcome::Existing(existing) => Ok(existing),
        }
    }

    fn plan_full(
        &self,
        cursor: &mut AllocatorCursor,
        purposes: &[StatusPurpose],
    ) -> Result<Plan, StatusError> {
        let capacity = self.config.capacity();
        let mut entries = BTreeMap::new();
        let mut new_shards = Vec::new();
        let mut rollovers = 0;

        for purpose in purposes {
            let previous = cursor.open.get(purpose).copied();
            let slot = match previous {
                Some(open) if open.next_offset < capacity => {
                    cursor.open.insert(
                        purpose.clone(),
                        OpenShard {
                            list_id: open.list_id,
                            next_offset: open.next_offset + 1,
                        },
                    );
                    StatusSlot {
                        list_id: open.list_id,
                        index: open.next_offset,
                    }
                }
                _ => {
                    if let Some(limit) = self.config.list_config().list_count() {
                        if cursor.next_list_id >= limit {
                            return Err(self.quota_exceeded(purpose.as_str(), limit));
                        }
                    }
                    let list_id = ListId(cursor.next_list_id);
                    cursor.next_list_id += 1;
                    cursor.open.insert(
                        purpose.clone(),
                        OpenShard {
                            list_id,
                            next_offset: 1,
                        },
                    );
                    new_shards.push(ShardKey::new(self.name().clone(), purpose.clone(), list_id));
                    if previous.is_some() {
                        rollovers += 1;
                    }
                    StatusSlot { list_id, index: 0 }
                }
            };
            entries.insert(purpose.clone(), slot);
        }

        Ok(Plan {
            assignment: CredentialStatusAssignment::Full { entries },
            new_shards,
            rollovers,
        })
    }

    fn plan_terse(&self, cursor: &mut AllocatorCursor) -> Result<Plan, StatusError> {
        let capacity = self.config.capacity();
        let terse_index = cursor.next_terse_index;
        if terse_index >= self.config.terse_index_space() {
            let purposes: Vec<&str> = self
                .config
                .status_purposes()
                .iter()
                .map(StatusPurpose::as_str)
                .collect();
            let limit = self.config.list_config().list_count().unwrap_or(1);
            return Err(self.quota_exceeded(&purposes.join(","), limit));
        }
        cursor.next_terse_index += 1;

        let mut new_shards = Vec::new();
        if terse_index % capacity == 0 {
            for purpose in self.config.status_purposes() {
                if let Some(slot) = self.config.terse_slot(terse_index, purpose) {
                    new_shards.push(ShardKey::new(
                        self.name().clone(),
                        purpose.clone(),
                        slot.list_id,
                    ));
                }
            }
        }
        let rollovers = if terse_index > 0 { new_shards.len() as u64 } else { 0 };

        Ok(Plan {
            assignment: CredentialStatusAssignment::Terse { terse_index },
            new_shards,
            rollovers,
        })
    }

    fn quota_exceeded(&self, purpose: &str, list_count: u64) -> StatusError {
        tracing::warn!(
            allocator = %self.name(),
            purpose = %purpose,
            list_count,
            "status list quota exhausted"
        );
        StatusError::QuotaExceeded {
            allocator: self.name().to_string(),
            purpose: purpose.to_string(),
            list_count,
        }
    }

    fn record(&self, credential_id: &CredentialId, plan: &Plan, version: u64) {
        let allocator = self.name().to_string();
        for key in &plan.new_shards {
            tracing::info!(
                allocator = %key.allocator,
                purpose = %key.purpose,
                list_id = %key.list_id,
                "opened status list"
            );
        }
        if plan.rollovers > 0 {
            metrics::counter!("vcsl_shard_rollovers_total", "allocator" => allocator.clone())
                .increment(plan.rollovers);
        }
        match &plan.assignment {
            CredentialStatusAssignment::Full { entries } => {
                for (purpose, slot) in entries {
                    tracing::debug!(
                        allocator = %allocator,
                        credential_id = %credential_id,
                        purpose = %purpose,
                        list_id = %slot.list_id,
                        index = slot.index,
                        version,
                        "allocated status slot"
                    );
                }
            }
            CredentialStatusAssignment::Terse { terse_index } => {
                tracing::debug!(
                    allocator = %allocator,
                    credential_id = %credential_id,
                    terse_index,
                    version,
                    "allocated terse status index"
                );
            }
        }
        metrics::counter!("vcsl_allocations_total", "allocator" => allocator).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::{BitstringStatusListConfig, ListConfig, TerseBitstringStatusListConfig};
    use crate::memory::MemoryStatusStore;

    fn full_config(list_count: Option<u64>, purposes: Vec<StatusPurpose>) -> StatusListConfig {
        StatusListConfig::Bitstring(BitstringStatusListConfig {
            index_allocator: AllocatorName::new("main").unwrap(),
            base_url: "https://status.example/lists".into(),
            status_purposes: purposes,
            list_config: ListConfig::new(8, 1, list_count).unwrap(),
        })
    }

    fn allocator(config: StatusListConfig) -> IndexAllocator {
        IndexAllocator::new(config, Arc::new(MemoryStatusStore::new()), RetryPolicy::default())
            .unwrap()
    }

    fn cid(n: usize) -> CredentialId {
        CredentialId::new(format!("urn:uuid:{n}")).unwrap()
    }

    fn slot(a: &CredentialStatusAssignment, p: &StatusPurpose) -> StatusSlot {
        match a {
            CredentialStatusAssignment::Full { entries } => entries[p],
            CredentialStatusAssignment::Terse { .. } => panic!("expected full assignment"),
        }
    }

    #[tokio::test]
    async fn allocation_is_idempotent_per_credential() {
        let alloc = allocator(full_config(None, vec![StatusPurpose::Revocation]));
        let purposes = [StatusPurpose::Revocation];
        let first = alloc.allocate(&cid(1), &purposes).await.unwrap();
        let second = alloc.allocate(&cid(1), &purposes).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        let other = alloc.allocate(&cid(2), &purposes).await.unwrap();
        assert_ne!(slot(&first, &purposes[0]), slot(&other, &purposes[0]));
    }

    #[tokio::test]
    async fn full_shard_rolls_over_to_new_list() {
        let alloc = allocator(full_config(None, vec![StatusPurpose::Revocation]));
        let p = StatusPurpose::Revocation;
        let mut lists = HashSet::new();
        for n in 0..9 {
            let a = alloc.allocate(&cid(n), std::slice::from_ref(&p)).await.unwrap();
            let s = slot(&a, &p);
            assert!(s.index < 8);
            lists.insert(s.list_id);
        }
        assert_eq!(lists.len(), 2);
    }

    #[tokio::test]
    async fn quota_exhaustion_records_nothing() {
        let alloc = allocator(full_config(Some(2), vec![StatusPurpose::Revocation]));
        let p = [StatusPurpose::Revocation];
        for n in 0..16 {
            alloc.allocate(&cid(n), &p).await.unwrap();
        }
        let err = alloc.allocate(&cid(16), &p).await.unwrap_err();
        assert!(matches!(err, StatusError::QuotaExceeded { list_count: 2, .. }));
        assert!(alloc.assignment(&cid(16)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_failure_on_second_purpose_is_all_or_nothing() {
        let purposes = vec![StatusPurpose::Revocation, StatusPurpose::Suspension];
        let alloc = allocator(full_config(Some(1), purposes.clone()));
        // one shared list id: revocation takes it, suspension has none left
        let err = alloc.allocate(&cid(0), &purposes).await.unwrap_err();
        assert!(matches!(err, StatusError::QuotaExceeded { .. }));
        assert!(alloc.assignment(&cid(0)).await.unwrap().is_none());
        let cursor = alloc.store().load_allocator(alloc.name()).await.unwrap();
        assert_eq!(cursor.version, 0);
    }

    #[tokio::test]
    async fn purposes_draw_distinct_list_ids() {
        let purposes = vec![StatusPurpose::Revocation, StatusPurpose::Suspension];
        let alloc = allocator(full_config(None, purposes.clone()));
        let a = alloc.allocate(&cid(0), &purposes).await.unwrap();
        assert_ne!(
            slot(&a, &StatusPurpose::Revocation).list_id,
            slot(&a, &StatusPurpose::Suspension).list_id
        );
    }

    #[tokio::test]
    async fn unknown_or_repeated_purpose_is_rejected() {
        let alloc = allocator(full_config(None, vec![StatusPurpose::Revocation]));
        assert!(alloc.allocate(&cid(0), &[StatusPurpose::Suspension]).await.is_err());
        assert!(alloc
            .allocate(&cid(0), &[StatusPurpose::Revocation, StatusPurpose::Revocation])
            .await
            .is_err());
        assert!(alloc.allocate(&cid(0), &[]).await.is_err());
    }

    #[tokio::test]
    async fn terse_indices_are_sequential_and_bounded() {
        let config = StatusListConfig::Terse(TerseBitstringStatusListConfig {
            index_allocator: AllocatorName::new("terse").unwrap(),
            base_url: "https://status.example/terse".into(),
            status_purposes: vec![StatusPurpose::Revocation, StatusPurpose::Suspension],
            list_config: ListConfig::new(4, 1, Some(2)).unwrap(),
        });
        let alloc = allocator(config);
        let all = [StatusPurpose::Revocation, StatusPurpose::Suspension];
        for n in 0..8 {
            let a = alloc.allocate(&cid(n), &all).await.unwrap();
            assert_eq!(a.terse_index(), Some(n as u64));
        }
        let err = alloc.allocate(&cid(8), &all).await.unwrap_err();
        assert!(matches!(err, StatusError::QuotaExceeded { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_never_share_a_slot() {
        let alloc = Arc::new(allocator(full_config(None, vec![StatusPurpose::Revocation])));
        let mut handles = Vec::new();
        for n in 0..64 {
            let alloc = Arc::clone(&alloc);
            handles.push(tokio::spawn(async move {
                let p = [StatusPurpose::Revocation];
                loop {
                    match alloc.allocate(&cid(n), &p).await {
                        Ok(a) => return slot(&a, &p[0]),
                        Err(StatusError::Contention { .. }) => continue,
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            assert!(seen.insert(h.await.unwrap()), "slot handed out twice");
        }
        assert_eq!(seen.len(), 64);
    }
}

#[cfg(test)]
mod proptests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::config::{BitstringStatusListConfig, ListConfig};
    use crate::memory::MemoryStatusStore;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Slots stay distinct and in range for any shard geometry.
        #[test]
        fn slots_unique_for_any_capacity(
            block_size in 1u64..6,
            block_count in 1u64..4,
            credentials in 1usize..60,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let config = StatusListConfig::Bitstring(BitstringStatusListConfig {
                index_allocator: AllocatorName::new("p").unwrap(),
                base_url: "https://status.example/p".into(),
                status_purposes: vec![StatusPurpose::Revocation],
                list_config: ListConfig::new(block_size, block_count, None).unwrap(),
            });
            let alloc = IndexAllocator::new(
                config,
                Arc::new(MemoryStatusStore::new()),
                RetryPolicy::default(),
            )
            .unwrap();
            let capacity = block_size * block_count;
            let p = [StatusPurpose::Revocation];
            let mut seen = HashSet::new();
            for n in 0..credentials {
                let id = CredentialId::new(format!("urn:c:{n}")).unwrap();
                let a = runtime.block_on(alloc.allocate(&id, &p)).unwrap();
                let CredentialStatusAssignment::Full { entries } = a else {
                    panic!("expected full assignment");
                };
                let s = entries[&p[0]];
                prop_assert!(s.index < capacity);
                prop_assert!(seen.insert(s));
            }
        }
    }
}
