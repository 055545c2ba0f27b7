//! # Document Store
//!
//! Durable key-value persistence for issuance records, keyed by credential
//! id. Inserts are create-only and updates are revision-checked, which is
//! what makes duplicate detection and crash-recovery claims race-free.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use vcsl_core::{CredentialId, StatusError};
use vcsl_status::Versioned;

use crate::record::CredentialRecord;

/// Revisioned storage of [`CredentialRecord`]s.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The record and its revision, if present.
    async fn get(
        &self,
        id: &CredentialId,
    ) -> Result<Option<Versioned<CredentialRecord>>, StatusError>;

    /// Create a record at revision 1.
    ///
    /// # Errors
    ///
    /// `Duplicate` if a record with this id exists.
    async fn insert(&self, record: CredentialRecord) -> Result<u64, StatusError>;

    /// Replace a record if it is still at `expected_revision`. Returns the
    /// new revision.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Conflict` if the revision moved.
    async fn update(
        &self,
        record: CredentialRecord,
        expected_revision: u64,
    ) -> Result<u64, StatusError>;

    /// Delete a record if it is still at `expected_revision`.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Conflict` if the revision moved.
    async fn remove(&self, id: &CredentialId, expected_revision: u64) -> Result<(), StatusError>;

    /// Reserve `alias` as a second key for the record `owner`. Aliases
    /// share the record key space: a reserved alias blocks [`insert`] of
    /// that id and vice versa. Reserving an alias the owner already holds
    /// succeeds.
    ///
    /// # Errors
    ///
    /// `Duplicate` if `alias` is a record id or held by another owner.
    ///
    /// [`insert`]: DocumentStore::insert
    async fn reserve_alias(
        &self,
        alias: &CredentialId,
        owner: &CredentialId,
    ) -> Result<(), StatusError>;

    /// The record id an alias points at.
    async fn alias_owner(&self, alias: &CredentialId) -> Result<Option<CredentialId>, StatusError>;
}

/// In-process [`DocumentStore`].
///
/// Records and aliases sit behind one `parking_lot` lock so a key is
/// checked against both in a single critical section. The lock is never
/// held across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Keyspace>,
}

#[derive(Debug, Default)]
struct Keyspace {
    records: HashMap<CredentialId, Versioned<CredentialRecord>>,
    aliases: HashMap<CredentialId, CredentialId>,
}

impl Keyspace {
    fn is_taken(&self, id: &CredentialId) -> bool {
        self.records.contains_key(id) || self.aliases.contains_key(id)
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, aliases excluded.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn record_conflict(id: &CredentialId, expected: u64, actual: u64) -> StatusError {
    StatusError::conflict(format!("credential record {id}"), expected, actual)
}

fn record_not_found(id: &CredentialId) -> StatusError {
    StatusError::NotFound(format!("credential record {id}"))
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(
        &self,
        id: &CredentialId,
    ) -> Result<Option<Versioned<CredentialRecord>>, StatusError> {
        Ok(self.inner.read().records.get(id).cloned())
    }

    async fn insert(&self, record: CredentialRecord) -> Result<u64, StatusError> {
        let mut guard = self.inner.write();
        if guard.is_taken(&record.id) {
            return Err(StatusError::Duplicate {
                credential_id: record.id.to_string(),
            });
        }
        guard.records.insert(
            record.id.clone(),
            Versioned {
                value: record,
                version: 1,
            },
        );
        Ok(1)
    }

    async fn update(
        &self,
        record: CredentialRecord,
        expected_revision: u64,
    ) -> Result<u64, StatusError> {
        let mut guard = self.inner.write();
        let current = guard
            .records
            .get_mut(&record.id)
            .ok_or_else(|| record_not_found(&record.id))?;
        if current.version != expected_revision {
            return Err(record_conflict(&record.id, expected_revision, current.version));
        }
        current.version += 1;
        current.value = record;
        Ok(current.version)
    }

    async fn remove(&self, id: &CredentialId, expected_revision: u64) -> Result<(), StatusError> {
        let mut guard = self.inner.write();
        let current = guard.records.get(id).ok_or_else(|| record_not_found(id))?;
        if current.version != expected_revision {
            return Err(record_conflict(id, expected_revision, current.version));
        }
        guard.records.remove(id);
        Ok(())
    }

    async fn reserve_alias(
        &self,
        alias: &CredentialId,
        owner: &CredentialId,
    ) -> Result<(), StatusError> {
        let mut guard = self.inner.write();
        match guard.aliases.get(alias).cloned() {
            Some(held_by) if &held_by == owner => Ok(()),
            None if !guard.records.contains_key(alias) => {
                guard.aliases.insert(alias.clone(), owner.clone());
                Ok(())
            }
            _ => Err(StatusError::Duplicate {
                credential_id: alias.to_string(),
            }),
        }
    }

    async fn alias_owner(&self, alias: &CredentialId) -> Result<Option<CredentialId>, StatusError> {
        Ok(self.inner.read().aliases.get(alias).cloned())
    }
}
