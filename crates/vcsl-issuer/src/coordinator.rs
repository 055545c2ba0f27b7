//! # Credential Issuance Coordinator
//!
//! The top-level entry point: validates a credential, binds it to status
//! list bits, persists it, and has it signed.
//!
//! ## Issuance Order
//!
//! 1. Validate shape, options and mandatory pointers. Nothing is written
//!    if any of these fail.
//! 2. Claim the credential id: create a `Pending` record, or take over a
//!    `Failed` or lease-expired `Pending` one. Any other existing record
//!    is a duplicate. When `options.credentialId` and `credential.id` are
//!    both given and differ, the document id is reserved as an alias of
//!    the record too, and a taken alias releases the claim.
//! 3. Allocate status bits. Allocation is idempotent per credential id, so
//!    a resumed attempt gets the slots the first attempt reserved.
//! 4. Persist the credential with its embedded `credentialStatus`.
//! 5. Sign. Failure leaves the record `Failed` with its assignment intact.
//! 6. Mark `Issued` and return the signed credential.
//!
//! ## Orphaned Indices
//!
//! A slot allocated to a credential id stays bound to that id forever,
//! whether or not the credential is ever issued. Slots are never reused.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;
use vcsl_core::{AllocatorName, CanonicalBytes, CredentialId, ShardKey, StatusError, StatusPurpose};
use vcsl_crypto::{SignRequest, Signer};
use vcsl_status::{IndexAllocator, PublishedStatusList, StatusEngine, StatusStore};

use crate::config::IssuerConfig;
use crate::credential::{validate_credential, VcVersion};
use crate::document::DocumentStore;
use crate::entry::{embed_status, status_entries};
use crate::options::IssueOptions;
use crate::pointer::check_mandatory_pointers;
use crate::record::{CredentialRecord, IssuanceState};

/// A claimed record and the revision this attempt last wrote.
struct Attempt {
    record: CredentialRecord,
    revision: u64,
    /// Created by this attempt rather than taken over.
    created: bool,
}

/// Issues credentials and serves their status lists.
pub struct Issuer {
    config: IssuerConfig,
    engine: StatusEngine,
    documents: Arc<dyn DocumentStore>,
    signer: Arc<dyn Signer>,
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer")
            .field("config", &self.config)
            .field("verification_method", &self.signer.verification_method())
            .finish_non_exhaustive()
    }
}

impl Issuer {
    pub fn new(
        config: IssuerConfig,
        status_store: Arc<dyn StatusStore>,
        documents: Arc<dyn DocumentStore>,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, StatusError> {
        config.validate()?;
        let engine = StatusEngine::new(
            config.issuer.clone(),
            config.status_lists.clone(),
            status_store,
            Arc::clone(&signer),
            config.retry_policy(),
            config.status_list_ttl,
        )?;
        Ok(Self {
            config,
            engine,
            documents,
            signer,
        })
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub fn engine(&self) -> &StatusEngine {
        &self.engine
    }

    /// Issue a credential with an unparsed `options` object.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed options, otherwise as [`Issuer::issue`].
    pub async fn issue_request(
        &self,
        credential: Value,
        options: Option<&Value>,
    ) -> Result<Value, StatusError> {
        let options = IssueOptions::from_value(options)?;
        self.issue(credential, options).await
    }

    /// Issue a credential.
    ///
    /// # Errors
    ///
    /// - `Validation` / `Data` for malformed input, before any write.
    /// - `Duplicate` if `options.credentialId` or `credential.id` is issued
    ///   or being issued.
    /// - `QuotaExceeded` if no status slot is left.
    /// - `Signing` if the signer fails; the record is left `Failed` and a
    ///   retry with the same id resumes it.
    pub async fn issue(
        &self,
        credential: Value,
        options: IssueOptions,
    ) -> Result<Value, StatusError> {
        if !options.mandatory_pointers.is_empty() && !self.signer.supports_selective_disclosure() {
            return Err(StatusError::validation(
                "mandatoryPointers require a selective disclosure signer",
            ));
        }
        let allocator = match (&options.index_allocator, self.engine.registry.is_empty()) {
            (None, true) => None,
            (name, _) => Some(Arc::clone(self.engine.registry.resolve(name.as_ref())?)),
        };

        let mut document = credential;
        let version = validate_credential(&mut document, &self.config.issuer, allocator.is_some())?;
        if version == VcVersion::V1 && allocator.as_ref().is_some_and(|a| a.config().is_terse()) {
            return Err(StatusError::validation(
                "terse status lists require a VC 2.x credential",
            ));
        }
        check_mandatory_pointers(&document, &options.mandatory_pointers)?;

        let document_id = document
            .get("id")
            .and_then(Value::as_str)
            .map(CredentialId::new)
            .transpose()?;
        let (credential_id, alias) = match (options.credential_id.clone(), document_id) {
            (Some(id), Some(document_id)) if id != document_id => (id, Some(document_id)),
            (Some(id), _) | (None, Some(id)) => (id, None),
            (None, None) => {
                let id = CredentialId::generate(Uuid::new_v4());
                document["id"] = Value::String(id.to_string());
                (id, None)
            }
        };

        let mut attempt = self.claim(&credential_id, &document).await?;
        if let Some(alias) = &alias {
            if let Err(err) = self.documents.reserve_alias(alias, &credential_id).await {
                self.release(attempt).await;
                return Err(err);
            }
        }
        match self
            .complete(&mut attempt, document, version, allocator.as_deref(), &options)
            .await
        {
            Ok(signed) => Ok(signed),
            Err(err) => {
                self.mark_failed(attempt, &err).await;
                Err(err)
            }
        }
    }

    async fn claim(
        &self,
        credential_id: &CredentialId,
        document: &Value,
    ) -> Result<Attempt, StatusError> {
        let now = Utc::now();
        match self.documents.get(credential_id).await? {
            None => {
                let record = CredentialRecord::pending(credential_id.clone(), document.clone());
                let revision = self.documents.insert(record.clone()).await?;
                Ok(Attempt {
                    record,
                    revision,
                    created: true,
                })
            }
            Some(existing) if existing.value.is_claimable(self.config.pending_lease, now) => {
                let mut record = existing.value;
                record.state = IssuanceState::Pending;
                record.attempts += 1;
                record.updated_at = now;
                match self.documents.update(record.clone(), existing.version).await {
                    Ok(revision) => {
                        tracing::info!(
                            credential_id = %credential_id,
                            attempt = record.attempts,
                            "resuming interrupted issuance"
                        );
                        Ok(Attempt {
                            record,
                            revision,
                            created: false,
                        })
                    }
                    Err(e) if e.is_conflict() => Err(duplicate(credential_id)),
                    Err(e) => Err(e),
                }
            }
            Some(_) => Err(duplicate(credential_id)),
        }
    }

    async fn complete(
        &self,
        attempt: &mut Attempt,
        mut document: Value,
        version: VcVersion,
        allocator: Option<&IndexAllocator>,
        options: &IssueOptions,
    ) -> Result<Value, StatusError> {
        if let Some(allocator) = allocator {
            if let Some(bound) = &attempt.record.allocator {
                if bound != allocator.name() {
                    return Err(StatusError::InvalidState(format!(
                        "credential {} is bound to indexAllocator {bound}",
                        attempt.record.id
                    )));
                }
            }
            let assignment = allocator
                .allocate(&attempt.record.id, allocator.config().status_purposes())
                .await?;
            let entries = status_entries(allocator.config(), &assignment, version)?;
            embed_status(&mut document, entries, version);
            attempt.record.allocator = Some(allocator.name().clone());
            attempt.record.assignment = Some(assignment);
        }

        attempt.record.document = document.clone();
        attempt.record.updated_at = Utc::now();
        self.persist(attempt).await?;

        let payload = CanonicalBytes::signing_input(&document)?;
        let proof = self
            .signer
            .sign(SignRequest {
                payload: &payload,
                mandatory_pointers: &options.mandatory_pointers,
                extra_information: options.extra_information.as_deref(),
            })
            .await
            .map_err(|e| match e {
                StatusError::Signing(_) => e,
                other => StatusError::Signing(other.to_string()),
            })?;
        document["proof"] =
            serde_json::to_value(&proof).map_err(|e| StatusError::Signing(e.to_string()))?;

        attempt.record.state = IssuanceState::Issued;
        attempt.record.document = document.clone();
        attempt.record.updated_at = Utc::now();
        self.persist(attempt).await?;

        metrics::counter!("vcsl_credentials_issued_total").increment(1);
        tracing::info!(
            credential_id = %attempt.record.id,
            allocator = ?attempt.record.allocator.as_ref().map(AllocatorName::as_str),
            attempt = attempt.record.attempts,
            "credential issued"
        );
        Ok(document)
    }

    /// Write the attempt's record. Losing the revision race means another
    /// attempt took the claim over.
    async fn persist(&self, attempt: &mut Attempt) -> Result<(), StatusError> {
        match self
            .documents
            .update(attempt.record.clone(), attempt.revision)
            .await
        {
            Ok(revision) => {
                attempt.revision = revision;
                Ok(())
            }
            Err(e) if e.is_conflict() => Err(duplicate(&attempt.record.id)),
            Err(e) => Err(e),
        }
    }

    async fn mark_failed(&self, mut attempt: Attempt, cause: &StatusError) {
        if matches!(cause, StatusError::Duplicate { .. }) {
            return;
        }
        tracing::warn!(
            credential_id = %attempt.record.id,
            error = %cause,
            "issuance failed, record left for retry"
        );
        attempt.record.state = IssuanceState::Failed;
        attempt.record.updated_at = Utc::now();
        if let Err(e) = self.persist(&mut attempt).await {
            tracing::warn!(
                credential_id = %attempt.record.id,
                error = %e,
                "could not mark issuance record failed"
            );
        }
    }

    /// Give up a claim before anything was allocated: a created record is
    /// deleted, a taken-over one goes back to `Failed`.
    async fn release(&self, mut attempt: Attempt) {
        let result = if attempt.created {
            self.documents
                .remove(&attempt.record.id, attempt.revision)
                .await
        } else {
            attempt.record.state = IssuanceState::Failed;
            attempt.record.updated_at = Utc::now();
            self.persist(&mut attempt).await
        };
        if let Err(e) = result {
            tracing::warn!(
                credential_id = %attempt.record.id,
                error = %e,
                "could not release issuance claim"
            );
        }
    }

    /// The persisted record for a credential id.
    pub async fn record(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<CredentialRecord>, StatusError> {
        Ok(self
            .documents
            .get(credential_id)
            .await?
            .map(|stored| stored.value))
    }

    /// Flip a status bit. See [`vcsl_status::StatusUpdateService`].
    pub async fn update_status(
        &self,
        credential_id: &CredentialId,
        allocator: Option<&AllocatorName>,
        credential_status: &Value,
        status: bool,
    ) -> Result<(), StatusError> {
        self.engine
            .updates
            .update_status(credential_id, allocator, credential_status, status)
            .await
    }

    /// Live status bit for a credential, read straight from the store.
    pub async fn credential_status(
        &self,
        credential_id: &CredentialId,
        allocator: Option<&AllocatorName>,
        purpose: &StatusPurpose,
    ) -> Result<bool, StatusError> {
        self.engine
            .updates
            .get_status(credential_id, allocator, purpose)
            .await
    }

    /// Signed status list credential for a shard.
    pub async fn get_published(
        &self,
        key: &ShardKey,
        refresh: bool,
    ) -> Result<Arc<PublishedStatusList>, StatusError> {
        self.engine.publisher.get_published(key, refresh).await
    }
}

fn duplicate(credential_id: &CredentialId) -> StatusError {
    StatusError::Duplicate {
        credential_id: credential_id.to_string(),
    }
}
