//! # Status Update Service
//!
//! Applies a status flip for an issued credential.
//!
//! The caller presents the `credentialStatus` entry it holds. The service
//! checks it against the assignment recorded at issuance, so a stale or
//! tampered reference is refused with `InvalidState` instead of flipping
//! somebody else's bit. The write is a versioned compare-and-set with
//! bounded retry, after which the publisher's cached artifact for that
//! shard is dropped. Republication happens on the next read.

use std::sync::Arc;

use serde_json::Value;
use vcsl_core::{AllocatorName, CredentialId, ShardKey, StatusError, StatusPurpose};

use crate::allocator::IndexAllocator;
use crate::assignment::StatusSlot;
use crate::publisher::StatusListPublisher;
use crate::registry::AllocatorRegistry;

pub const BITSTRING_STATUS_LIST_ENTRY: &str = "BitstringStatusListEntry";
pub const STATUS_LIST_2021_ENTRY: &str = "StatusList2021Entry";
pub const TERSE_BITSTRING_STATUS_LIST_ENTRY: &str = "TerseBitstringStatusListEntry";

/// A caller-supplied `credentialStatus` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDescriptor {
    /// `BitstringStatusListEntry` or `StatusList2021Entry`.
    Entry {
        entry_type: String,
        purpose: StatusPurpose,
        status_list_credential: String,
        index: u64,
    },
    /// `TerseBitstringStatusListEntry`, plus the purpose being changed.
    Terse {
        base_url: String,
        terse_index: u64,
        purpose: StatusPurpose,
    },
}

impl StatusDescriptor {
    /// Parse a `credentialStatus` JSON object.
    pub fn from_value(value: &Value) -> Result<Self, StatusError> {
        let obj = value
            .as_object()
            .ok_or_else(|| StatusError::validation("credentialStatus must be an object"))?;
        let entry_type = required_str(value, "type")?;
        match entry_type {
            BITSTRING_STATUS_LIST_ENTRY | STATUS_LIST_2021_ENTRY => Ok(Self::Entry {
                entry_type: entry_type.to_string(),
                purpose: required_str(value, "statusPurpose")?.parse()?,
                status_list_credential: required_str(value, "statusListCredential")?.to_string(),
                index: index_field(obj.get("statusListIndex"), "statusListIndex")?,
            }),
            TERSE_BITSTRING_STATUS_LIST_ENTRY => Ok(Self::Terse {
                base_url: required_str(value, "terseStatusListBaseUrl")?.to_string(),
                terse_index: index_field(obj.get("terseStatusListIndex"), "terseStatusListIndex")?,
                purpose: required_str(value, "statusPurpose")?.parse()?,
            }),
            other => Err(StatusError::validation(format!(
                "unsupported credentialStatus type {other:?}"
            ))),
        }
    }

    pub fn purpose(&self) -> &StatusPurpose {
        match self {
            Self::Entry { purpose, .. } | Self::Terse { purpose, .. } => purpose,
        }
    }
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, StatusError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StatusError::validation(format!("credentialStatus.{field} must be a string")))
}

/// Indices arrive as decimal strings in full entries and as integers in
/// terse entries. Both forms are accepted.
fn index_field(value: Option<&Value>, field: &str) -> Result<u64, StatusError> {
    match value {
        Some(Value::String(s)) => s.parse().map_err(|_| {
            StatusError::validation(format!("credentialStatus.{field} {s:?} is not an index"))
        }),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            StatusError::validation(format!("credentialStatus.{field} {n} is not an index"))
        }),
        _ => Err(StatusError::validation(format!(
            "credentialStatus.{field} is required"
        ))),
    }
}

/// Applies status flips and keeps the publisher cache honest.
#[derive(Debug)]
pub struct StatusUpdateService {
    registry: Arc<AllocatorRegistry>,
    publisher: Arc<StatusListPublisher>,
}

impl StatusUpdateService {
    pub fn new(registry: Arc<AllocatorRegistry>, publisher: Arc<StatusListPublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Set the status bit a descriptor refers to.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed descriptor.
    /// - `NotFound` if the credential has no assignment under the allocator.
    /// - `InvalidState` if the descriptor does not match the assignment.
    /// - `Contention` if the shard write kept conflicting.
    pub async fn update_status(
        &self,
        credential_id: &CredentialId,
        allocator: Option<&AllocatorName>,
        credential_status: &Value,
        status: bool,
    ) -> Result<(), StatusError> {
        let descriptor = StatusDescriptor::from_value(credential_status)?;
        let allocator = self.registry.resolve(allocator)?;
        let (key, slot) = self.locate(allocator, credential_id, &descriptor).await?;
        let capacity = allocator.config().capacity();
        let store = allocator.store();

        let resource = format!("status list {key}");
        let shard_key = &key;
        let version = allocator
            .retry()
            .run(&resource, move |_| async move {
                let shard = store.get_shard(shard_key, capacity).await?;
                store
                    .set_bit(shard_key, slot.index, status, shard.version)
                    .await
            })
            .await?;

        self.publisher.invalidate(&key);
        metrics::counter!(
            "vcsl_status_updates_total",
            "allocator" => key.allocator.to_string(),
            "purpose" => key.purpose.to_string()
        )
        .increment(1);
        tracing::info!(
            credential_id = %credential_id,
            allocator = %key.allocator,
            purpose = %key.purpose,
            list_id = %key.list_id,
            index = slot.index,
            status,
            version,
            "status updated"
        );
        Ok(())
    }

    /// Read the live status bit for a credential and purpose.
    pub async fn get_status(
        &self,
        credential_id: &CredentialId,
        allocator: Option<&AllocatorName>,
        purpose: &StatusPurpose,
    ) -> Result<bool, StatusError> {
        let allocator = self.registry.resolve(allocator)?;
        let assignment = allocator
            .assignment(credential_id)
            .await?
            .ok_or_else(|| not_assigned(allocator, credential_id))?;
        let slot = allocator
            .config()
            .resolve_slot(&assignment, purpose)
            .ok_or_else(|| {
                StatusError::NotFound(format!(
                    "credential {credential_id} has no {purpose} status"
                ))
            })?;
        let key = ShardKey::new(allocator.name().clone(), purpose.clone(), slot.list_id);
        let shard = allocator
            .store()
            .get_shard(&key, allocator.config().capacity())
            .await?;
        shard.value.get(slot.index)
    }

    async fn locate(
        &self,
        allocator: &IndexAllocator,
        credential_id: &CredentialId,
        descriptor: &StatusDescriptor,
    ) -> Result<(ShardKey, StatusSlot), StatusError> {
        let assignment = allocator
            .assignment(credential_id)
            .await?
            .ok_or_else(|| not_assigned(allocator, credential_id))?;
        let config = allocator.config();
        let purpose = descriptor.purpose();
        let mismatch = |what: &str| {
            StatusError::InvalidState(format!(
                "credentialStatus {what} does not match the status assigned to {credential_id}"
            ))
        };

        let slot = config
            .resolve_slot(&assignment, purpose)
            .ok_or_else(|| mismatch("statusPurpose"))?;
        match descriptor {
            StatusDescriptor::Entry {
                status_list_credential,
                index,
                ..
            } => {
                if assignment.is_terse() {
                    return Err(mismatch("type"));
                }
                if *status_list_credential != config.list_url(purpose, slot.list_id) {
                    return Err(mismatch("statusListCredential"));
                }
                if *index != slot.index {
                    return Err(mismatch("statusListIndex"));
                }
            }
            StatusDescriptor::Terse {
                base_url,
                terse_index,
                ..
            } => {
                if assignment.terse_index() != Some(*terse_index) {
                    return Err(mismatch(if assignment.is_terse() {
                        "terseStatusListIndex"
                    } else {
                        "type"
                    }));
                }
                if base_url.trim_end_matches('/') != config.base_url() {
                    return Err(mismatch("terseStatusListBaseUrl"));
                }
            }
        }
        Ok((
            ShardKey::new(allocator.name().clone(), purpose.clone(), slot.list_id),
            slot,
        ))
    }
}

fn not_assigned(allocator: &IndexAllocator, credential_id: &CredentialId) -> StatusError {
    StatusError::NotFound(format!(
        "credential {credential_id} has no status assignment under allocator {}",
        allocator.name()
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vcsl_crypto::{Ed25519KeyPair, Ed25519Signer};

    use super::*;
    use crate::config::{
        BitstringStatusListConfig, ListConfig, StatusListConfig, TerseBitstringStatusListConfig,
    };
    use crate::memory::MemoryStatusStore;
    use crate::retry::RetryPolicy;

    fn both() -> Vec<StatusPurpose> {
        vec![StatusPurpose::Revocation, StatusPurpose::Suspension]
    }

    fn service(config: StatusListConfig) -> (Arc<AllocatorRegistry>, StatusUpdateService) {
        let registry = Arc::new(
            AllocatorRegistry::new(
                vec![config],
                Arc::new(MemoryStatusStore::new()),
                RetryPolicy::default(),
            )
            .unwrap(),
        );
        let signer = Arc::new(Ed25519Signer::new(
            Ed25519KeyPair::from_seed(&[1; 32]),
            "did:example:i#k",
        ));
        let publisher = Arc::new(StatusListPublisher::new(
            "did:example:i",
            Arc::clone(&registry),
            signer,
        ));
        let service = StatusUpdateService::new(Arc::clone(&registry), publisher);
        (registry, service)
    }

    fn full() -> StatusListConfig {
        StatusListConfig::Bitstring(BitstringStatusListConfig {
            index_allocator: AllocatorName::new("main").unwrap(),
            base_url: "https://status.example/lists".into(),
            status_purposes: both(),
            list_config: ListConfig::new(8, 1, None).unwrap(),
        })
    }

    fn cid() -> CredentialId {
        CredentialId::new("urn:uuid:c1").unwrap()
    }

    fn entry(purpose: &str, list: u64, index: u64) -> Value {
        json!({
            "type": "BitstringStatusListEntry",
            "statusPurpose": purpose,
            "statusListCredential": format!("https://status.example/lists/{list}"),
            "statusListIndex": index.to_string(),
        })
    }

    #[test]
    fn descriptor_parsing() {
        let d = StatusDescriptor::from_value(&entry("revocation", 0, 3)).unwrap();
        assert_eq!(d.purpose(), &StatusPurpose::Revocation);
        assert!(StatusDescriptor::from_value(&json!("nope")).is_err());
        assert!(StatusDescriptor::from_value(&json!({"type": "Unknown"})).is_err());
        let bad_index = json!({
            "type": "BitstringStatusListEntry",
            "statusPurpose": "revocation",
            "statusListCredential": "https://x/0",
            "statusListIndex": "three",
        });
        assert!(matches!(
            StatusDescriptor::from_value(&bad_index),
            Err(StatusError::Validation(_))
        ));
        let terse_without_purpose = json!({
            "type": "TerseBitstringStatusListEntry",
            "terseStatusListBaseUrl": "https://x",
            "terseStatusListIndex": 4,
        });
        assert!(StatusDescriptor::from_value(&terse_without_purpose).is_err());
    }

    #[tokio::test]
    async fn flip_round_trip_and_purpose_independence() {
        let (registry, service) = service(full());
        registry
            .resolve(None)
            .unwrap()
            .allocate(&cid(), &both())
            .await
            .unwrap();
        // revocation opened list 0, suspension list 1
        service
            .update_status(&cid(), None, &entry("revocation", 0, 0), true)
            .await
            .unwrap();
        assert!(service
            .get_status(&cid(), None, &StatusPurpose::Revocation)
            .await
            .unwrap());
        assert!(!service
            .get_status(&cid(), None, &StatusPurpose::Suspension)
            .await
            .unwrap());

        service
            .update_status(&cid(), None, &entry("revocation", 0, 0), false)
            .await
            .unwrap();
        assert!(!service
            .get_status(&cid(), None, &StatusPurpose::Revocation)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unknown_credential_is_not_found() {
        let (_registry, service) = service(full());
        let err = service
            .update_status(&cid(), None, &entry("revocation", 0, 0), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::NotFound(_)));
    }

    #[tokio::test]
    async fn mismatched_descriptor_is_invalid_state() {
        let (registry, service) = service(full());
        registry
            .resolve(None)
            .unwrap()
            .allocate(&cid(), &both())
            .await
            .unwrap();
        for wrong in [
            entry("revocation", 0, 5),
            entry("revocation", 1, 0),
            entry("refresh", 0, 0),
        ] {
            let err = service
                .update_status(&cid(), None, &wrong, true)
                .await
                .unwrap_err();
            assert!(matches!(err, StatusError::InvalidState(_)), "{wrong}");
        }
        let terse = json!({
            "type": "TerseBitstringStatusListEntry",
            "terseStatusListBaseUrl": "https://status.example/lists",
            "terseStatusListIndex": 0,
            "statusPurpose": "revocation",
        });
        let err = service
            .update_status(&cid(), None, &terse, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::InvalidState(_)));
    }

    #[tokio::test]
    async fn terse_descriptor_flips_derived_slot() {
        let config = StatusListConfig::Terse(TerseBitstringStatusListConfig {
            index_allocator: AllocatorName::new("terse").unwrap(),
            base_url: "https://status.example/terse".into(),
            status_purposes: both(),
            list_config: ListConfig::new(4, 1, Some(2)).unwrap(),
        });
        let (registry, service) = service(config);
        let alloc = registry.resolve(None).unwrap();
        for n in 0..6 {
            let id = CredentialId::new(format!("urn:uuid:t{n}")).unwrap();
            alloc.allocate(&id, &both()).await.unwrap();
        }
        let id = CredentialId::new("urn:uuid:t5").unwrap();
        let descriptor = json!({
            "type": "TerseBitstringStatusListEntry",
            "terseStatusListBaseUrl": "https://status.example/terse",
            "terseStatusListIndex": 5,
            "statusPurpose": "suspension",
        });
        service
            .update_status(&id, None, &descriptor, true)
            .await
            .unwrap();
        assert!(service
            .get_status(&id, None, &StatusPurpose::Suspension)
            .await
            .unwrap());
        assert!(!service
            .get_status(&id, None, &StatusPurpose::Revocation)
            .await
            .unwrap());
        // suspension list index 1 is internal list id 1 * 2 + 1
        let key = ShardKey::new(
            alloc.name().clone(),
            StatusPurpose::Suspension,
            vcsl_core::ListId(3),
        );
        let shard = alloc.store().get_shard(&key, 4).await.unwrap();
        assert!(shard.value.get(1).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_flips_in_one_shard_all_land() {
        let config = StatusListConfig::Bitstring(BitstringStatusListConfig {
            index_allocator: AllocatorName::new("main").unwrap(),
            base_url: "https://status.example/lists".into(),
            status_purposes: vec![StatusPurpose::Revocation],
            list_config: ListConfig::new(8, 1, None).unwrap(),
        });
        let (registry, service) = service(config);
        let service = Arc::new(service);
        let alloc = Arc::clone(registry.resolve(None).unwrap());
        for n in 0..8 {
            let id = CredentialId::new(format!("urn:uuid:f{n}")).unwrap();
            alloc.allocate(&id, &[StatusPurpose::Revocation]).await.unwrap();
        }
        let mut handles = Vec::new();
        for n in 0..8u64 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                let id = CredentialId::new(format!("urn:uuid:f{n}")).unwrap();
                loop {
                    match service
                        .update_status(&id, None, &entry("revocation", 0, n), true)
                        .await
                    {
                        Ok(()) => break,
                        Err(StatusError::Contention { .. }) => continue,
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let key = ShardKey::new(
            alloc.name().clone(),
            StatusPurpose::Revocation,
            vcsl_core::ListId(0),
        );
        let shard = alloc.store().get_shard(&key, 8).await.unwrap();
        assert_eq!(shard.value.count_ones(), 8);
        assert_eq!(shard.version, 8);
    }
}
