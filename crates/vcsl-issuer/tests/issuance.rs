//! # Issuance Flows
//!
//! End-to-end issuance against in-memory stores: index uniqueness,
//! idempotent allocation, duplicate rejection, rollover, quota, and
//! resumption after a failed or abandoned attempt.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use vcsl_core::{AllocatorName, CredentialId, StatusError, StatusPurpose};
use vcsl_crypto::{
    verify_document, Ed25519KeyPair, Ed25519Signer, Proof, SignRequest, Signer,
};
use vcsl_issuer::{
    CredentialRecord, DocumentStore, IssuanceState, IssueOptions, Issuer, IssuerConfig,
    MemoryDocumentStore,
};
use vcsl_status::{
    BitstringStatusListConfig, ListConfig, MemoryStatusStore, StatusListConfig, StatusStore,
};

const ISSUER: &str = "did:example:issuer";

fn ed25519() -> Ed25519Signer {
    Ed25519Signer::new(Ed25519KeyPair::from_seed(&[7; 32]), "did:example:issuer#key-1")
}

fn list_config(
    name: &str,
    purposes: Vec<StatusPurpose>,
    block_size: u64,
    list_count: Option<u64>,
) -> StatusListConfig {
    StatusListConfig::Bitstring(BitstringStatusListConfig {
        index_allocator: AllocatorName::new(name).unwrap(),
        base_url: format!("https://status.example/{name}"),
        status_purposes: purposes,
        list_config: ListConfig::new(block_size, 1, list_count).unwrap(),
    })
}

struct Harness {
    issuer: Arc<Issuer>,
    documents: Arc<MemoryDocumentStore>,
    status: Arc<MemoryStatusStore>,
}

fn harness(config: IssuerConfig, signer: Arc<dyn Signer>) -> Harness {
    let documents = Arc::new(MemoryDocumentStore::new());
    let status = Arc::new(MemoryStatusStore::new());
    let issuer = Issuer::new(
        config,
        Arc::clone(&status) as Arc<dyn StatusStore>,
        Arc::clone(&documents) as Arc<dyn DocumentStore>,
        signer,
    )
    .unwrap();
    Harness {
        issuer: Arc::new(issuer),
        documents,
        status,
    }
}

fn revocation_harness(block_size: u64, list_count: Option<u64>) -> Harness {
    let config = IssuerConfig::new(ISSUER).with_status_list(list_config(
        "main",
        vec![StatusPurpose::Revocation],
        block_size,
        list_count,
    ));
    harness(config, Arc::new(ed25519()))
}

fn credential() -> Value {
    json!({
        "@context": ["https://www.w3.org/ns/credentials/v2"],
        "type": ["VerifiableCredential"],
        "credentialSubject": {"id": "did:example:subject", "degree": "BSc"}
    })
}

fn with_id(id: &str) -> IssueOptions {
    IssueOptions {
        credential_id: Some(CredentialId::new(id).unwrap()),
        ..IssueOptions::default()
    }
}

fn slot_of(vc: &Value) -> (String, String) {
    let status = &vc["credentialStatus"];
    (
        status["statusListCredential"].as_str().unwrap().to_string(),
        status["statusListIndex"].as_str().unwrap().to_string(),
    )
}

/// Fails the first `failures` calls, then delegates.
struct FlakySigner {
    inner: Ed25519Signer,
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Signer for FlakySigner {
    async fn sign(&self, request: SignRequest<'_>) -> Result<Proof, StatusError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(StatusError::Signing("key service unavailable".into()));
        }
        self.inner.sign(request).await
    }

    fn verification_method(&self) -> &str {
        self.inner.verification_method()
    }
}

/// Records the options of every request it signs.
#[derive(Default)]
struct CapturingSigner {
    seen: parking_lot::Mutex<Vec<(Vec<String>, Option<Vec<u8>>)>>,
}

#[async_trait]
impl Signer for CapturingSigner {
    async fn sign(&self, request: SignRequest<'_>) -> Result<Proof, StatusError> {
        self.seen.lock().push((
            request.mandatory_pointers.to_vec(),
            request.extra_information.map(<[u8]>::to_vec),
        ));
        ed25519().sign(SignRequest::plain(request.payload)).await
    }

    fn verification_method(&self) -> &str {
        "did:example:issuer#key-1"
    }

    fn supports_selective_disclosure(&self) -> bool {
        true
    }
}

/// Accepts mandatory pointers and ignores them.
struct SelectiveSigner(Ed25519Signer);

#[async_trait]
impl Signer for SelectiveSigner {
    async fn sign(&self, request: SignRequest<'_>) -> Result<Proof, StatusError> {
        self.0.sign(SignRequest::plain(request.payload)).await
    }

    fn verification_method(&self) -> &str {
        self.0.verification_method()
    }

    fn supports_selective_disclosure(&self) -> bool {
        true
    }
}

// =========================================================================
// Signing and embedding
// =========================================================================

#[tokio::test]
async fn issued_credential_carries_status_and_verifiable_proof() {
    let signer = ed25519();
    let public_key = signer.public_key();
    let config = IssuerConfig::new(ISSUER).with_status_list(list_config(
        "main",
        vec![StatusPurpose::Revocation],
        8,
        None,
    ));
    let h = harness(config, Arc::new(signer));

    let vc = h.issuer.issue(credential(), IssueOptions::default()).await.unwrap();

    assert_eq!(vc["issuer"], ISSUER);
    assert!(vc["id"].as_str().unwrap().starts_with("urn:uuid:"));
    assert_eq!(vc["credentialStatus"]["type"], "BitstringStatusListEntry");
    assert_eq!(vc["credentialStatus"]["statusPurpose"], "revocation");
    assert_eq!(
        vc["credentialStatus"]["statusListCredential"],
        "https://status.example/main/0"
    );
    assert_eq!(vc["credentialStatus"]["statusListIndex"], "0");
    verify_document(&vc, &public_key).expect("proof covers the embedded status");

    let id = CredentialId::new(vc["id"].as_str().unwrap()).unwrap();
    let record = h.issuer.record(&id).await.unwrap().unwrap();
    assert_eq!(record.state, IssuanceState::Issued);
    assert_eq!(record.document, vc);
}

#[tokio::test]
async fn credential_without_status_configuration_is_signed_plainly() {
    let h = harness(IssuerConfig::new(ISSUER), Arc::new(ed25519()));
    let vc = h.issuer.issue(credential(), IssueOptions::default()).await.unwrap();
    assert!(vc.get("credentialStatus").is_none());
    assert!(vc.get("proof").is_some());
}

#[tokio::test]
async fn v1_credential_gets_status_list_2021_entry() {
    let h = revocation_harness(8, None);
    let v1 = json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "type": ["VerifiableCredential"],
        "issuanceDate": "2024-01-01T00:00:00Z",
        "credentialSubject": {"id": "did:example:s"}
    });
    let vc = h.issuer.issue(v1, IssueOptions::default()).await.unwrap();
    assert_eq!(vc["credentialStatus"]["type"], "StatusList2021Entry");
    assert_eq!(vc["@context"][1], "https://w3id.org/vc/status-list/2021/v1");
}

// =========================================================================
// Uniqueness and idempotency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_never_shares_a_slot() {
    let h = revocation_harness(64, None);
    let mut tasks = Vec::new();
    for _ in 0..40 {
        let issuer = Arc::clone(&h.issuer);
        tasks.push(tokio::spawn(async move {
            issuer.issue(credential(), IssueOptions::default()).await
        }));
    }

    let mut slots = HashSet::new();
    for task in tasks {
        let vc = task.await.unwrap().unwrap();
        assert!(slots.insert(slot_of(&vc)), "slot handed out twice");
    }
    assert_eq!(slots.len(), 40);
}

#[tokio::test]
async fn allocation_is_idempotent_per_credential_id() {
    let h = revocation_harness(8, None);
    let allocator = h
        .issuer
        .engine()
        .registry
        .get(&AllocatorName::new("main").unwrap())
        .unwrap();
    let id = CredentialId::new("urn:uuid:idempotent").unwrap();
    let purposes = [StatusPurpose::Revocation];

    let first = allocator.allocate(&id, &purposes).await.unwrap();
    let second = allocator.allocate(&id, &purposes).await.unwrap();
    assert_eq!(first, second);

    let vc = h.issuer.issue(credential(), with_id("urn:uuid:idempotent")).await.unwrap();
    assert_eq!(vc["credentialStatus"]["statusListIndex"], "0");
    let cursor = h.status.load_allocator(allocator.name()).await.unwrap();
    assert_eq!(cursor.value.next_list_id, 1);
}

#[tokio::test]
async fn sequential_duplicate_is_rejected() {
    let h = revocation_harness(8, None);
    h.issuer.issue(credential(), with_id("urn:uuid:dup")).await.unwrap();
    let err = h
        .issuer
        .issue(credential(), with_id("urn:uuid:dup"))
        .await
        .unwrap_err();
    assert!(matches!(err, StatusError::Duplicate { .. }));
}

#[tokio::test]
async fn duplicate_detected_from_document_id() {
    let h = revocation_harness(8, None);
    let mut vc = credential();
    vc["id"] = json!("urn:uuid:in-document");
    h.issuer.issue(vc.clone(), IssueOptions::default()).await.unwrap();
    let err = h.issuer.issue(vc, IssueOptions::default()).await.unwrap_err();
    assert!(matches!(err, StatusError::Duplicate { .. }));
}

#[tokio::test]
async fn issued_document_id_is_a_duplicate_under_another_credential_id() {
    let h = revocation_harness(8, None);
    let mut vc = credential();
    vc["id"] = json!("urn:uuid:same");
    h.issuer.issue(vc.clone(), IssueOptions::default()).await.unwrap();

    let err = h.issuer.issue(vc, with_id("urn:uuid:other")).await.unwrap_err();
    match err {
        StatusError::Duplicate { credential_id } => assert_eq!(credential_id, "urn:uuid:same"),
        other => panic!("expected a duplicate, got {other}"),
    }
    let other = CredentialId::new("urn:uuid:other").unwrap();
    assert!(h.issuer.record(&other).await.unwrap().is_none());

    // The rejected attempt reserved no slot.
    let next = h.issuer.issue(credential(), IssueOptions::default()).await.unwrap();
    assert_eq!(next["credentialStatus"]["statusListIndex"], "1");
}

#[tokio::test]
async fn document_id_issued_under_a_credential_id_stays_reserved() {
    let h = revocation_harness(8, None);
    let mut vc = credential();
    vc["id"] = json!("urn:uuid:document");
    let issued = h
        .issuer
        .issue(vc.clone(), with_id("urn:uuid:key"))
        .await
        .unwrap();
    assert_eq!(issued["id"], "urn:uuid:document");

    let err = h.issuer.issue(vc.clone(), IssueOptions::default()).await.unwrap_err();
    assert!(matches!(err, StatusError::Duplicate { .. }));
    let err = h.issuer.issue(vc, with_id("urn:uuid:another-key")).await.unwrap_err();
    assert!(matches!(err, StatusError::Duplicate { .. }));

    let alias = CredentialId::new("urn:uuid:document").unwrap();
    assert_eq!(
        h.documents.alias_owner(&alias).await.unwrap(),
        Some(CredentialId::new("urn:uuid:key").unwrap())
    );
    assert_eq!(h.documents.len(), 1);
}

#[tokio::test]
async fn failed_issue_with_both_ids_resumes_under_the_same_alias() {
    let signer = FlakySigner {
        inner: ed25519(),
        failures: 1,
        calls: AtomicUsize::new(0),
    };
    let config = IssuerConfig::new(ISSUER).with_status_list(list_config(
        "main",
        vec![StatusPurpose::Revocation],
        8,
        None,
    ));
    let h = harness(config, Arc::new(signer));
    let mut vc = credential();
    vc["id"] = json!("urn:uuid:doc-flaky");

    let err = h.issuer.issue(vc.clone(), with_id("urn:uuid:key-flaky")).await.unwrap_err();
    assert!(matches!(err, StatusError::Signing(_)));
    let signed = h.issuer.issue(vc, with_id("urn:uuid:key-flaky")).await.unwrap();
    assert_eq!(signed["credentialStatus"]["statusListIndex"], "0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_issue_exactly_once() {
    let h = revocation_harness(8, None);
    let mut tasks = Vec::new();
    for _ in 0..12 {
        let issuer = Arc::clone(&h.issuer);
        tasks.push(tokio::spawn(async move {
            issuer.issue(credential(), with_id("urn:uuid:contested")).await
        }));
    }

    let mut issued = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => issued += 1,
            Err(StatusError::Duplicate { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(issued, 1);
    assert_eq!(h.documents.len(), 1);
}

// =========================================================================
// Capacity
// =========================================================================

#[tokio::test]
async fn ninth_credential_rolls_over_to_a_new_list() {
    let h = revocation_harness(8, None);
    let mut slots = Vec::new();
    for _ in 0..9 {
        let vc = h.issuer.issue(credential(), IssueOptions::default()).await.unwrap();
        slots.push(slot_of(&vc));
    }
    for (i, (url, index)) in slots.iter().take(8).enumerate() {
        assert_eq!(url, "https://status.example/main/0");
        assert_eq!(index, &i.to_string());
    }
    assert_eq!(slots[8].0, "https://status.example/main/1");
    assert_eq!(slots[8].1, "0");
}

#[tokio::test]
async fn quota_exhaustion_fails_without_side_effects() {
    let h = revocation_harness(8, Some(2));
    for _ in 0..16 {
        h.issuer.issue(credential(), IssueOptions::default()).await.unwrap();
    }
    let err = h
        .issuer
        .issue(credential(), with_id("urn:uuid:seventeenth"))
        .await
        .unwrap_err();
    assert!(matches!(err, StatusError::QuotaExceeded { list_count: 2, .. }));

    let record = h
        .issuer
        .record(&CredentialId::new("urn:uuid:seventeenth").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, IssuanceState::Failed);
    assert!(record.assignment.is_none());
}

// =========================================================================
// Validation happens before any write
// =========================================================================

#[tokio::test]
async fn unresolvable_pointer_is_a_data_error_and_allocates_nothing() {
    let config = IssuerConfig::new(ISSUER).with_status_list(list_config(
        "main",
        vec![StatusPurpose::Revocation],
        8,
        None,
    ));
    let h = harness(config, Arc::new(SelectiveSigner(ed25519())));
    let options = IssueOptions {
        mandatory_pointers: vec!["/credentialSubject/missing".into()],
        ..IssueOptions::default()
    };

    let err = h.issuer.issue(credential(), options).await.unwrap_err();
    match err {
        StatusError::Data { value, .. } => assert_eq!(value, "/credentialSubject/missing"),
        other => panic!("expected a data error, got {other}"),
    }
    assert!(h.documents.is_empty());
    let cursor = h
        .status
        .load_allocator(&AllocatorName::new("main").unwrap())
        .await
        .unwrap();
    assert_eq!(cursor.version, 0);
}

#[tokio::test]
async fn extra_information_reaches_the_signer_unmodified() {
    let signer = Arc::new(CapturingSigner::default());
    let config = IssuerConfig::new(ISSUER).with_status_list(list_config(
        "main",
        vec![StatusPurpose::Revocation],
        8,
        None,
    ));
    let h = harness(config, Arc::clone(&signer) as Arc<dyn Signer>);
    let options = json!({
        "extraInformation": "AAEC-vv_aGk",
        "mandatoryPointers": ["/issuer"],
    });

    h.issuer
        .issue_request(credential(), Some(&options))
        .await
        .unwrap();

    let seen = signer.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, vec!["/issuer".to_string()]);
    assert_eq!(
        seen[0].1.as_deref(),
        Some(&[0u8, 1, 2, 250, 251, 255, 104, 105][..])
    );
}

#[tokio::test]
async fn non_string_extra_information_is_rejected_before_any_write() {
    let signer = Arc::new(CapturingSigner::default());
    let config = IssuerConfig::new(ISSUER).with_status_list(list_config(
        "main",
        vec![StatusPurpose::Revocation],
        8,
        None,
    ));
    let h = harness(config, Arc::clone(&signer) as Arc<dyn Signer>);

    for bad in [json!(42), json!({"bytes": "AA"}), json!("not base64!")] {
        let options = json!({"extraInformation": bad.clone()});
        let err = h
            .issuer
            .issue_request(credential(), Some(&options))
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::Validation(_)), "{bad}");
    }
    assert!(h.documents.is_empty());
    assert!(signer.seen.lock().is_empty());
    let cursor = h
        .status
        .load_allocator(&AllocatorName::new("main").unwrap())
        .await
        .unwrap();
    assert_eq!(cursor.version, 0);
}

#[tokio::test]
async fn mandatory_pointers_need_selective_disclosure_signer() {
    let h = revocation_harness(8, None);
    let options = IssueOptions {
        mandatory_pointers: vec!["/issuer".into()],
        ..IssueOptions::default()
    };
    let err = h.issuer.issue(credential(), options).await.unwrap_err();
    assert!(matches!(err, StatusError::Validation(_)));
}

#[tokio::test]
async fn credential_with_existing_status_is_rejected() {
    let h = revocation_harness(8, None);
    let mut vc = credential();
    vc["credentialStatus"] = json!({"type": "BitstringStatusListEntry"});
    let err = h.issuer.issue(vc, IssueOptions::default()).await.unwrap_err();
    assert!(matches!(err, StatusError::Validation(_)));
    assert!(h.documents.is_empty());
}

#[tokio::test]
async fn several_allocators_require_a_choice() {
    let config = IssuerConfig::new(ISSUER)
        .with_status_list(list_config("a", vec![StatusPurpose::Revocation], 8, None))
        .with_status_list(list_config("b", vec![StatusPurpose::Suspension], 8, None));
    let h = harness(config, Arc::new(ed25519()));

    let err = h.issuer.issue(credential(), IssueOptions::default()).await.unwrap_err();
    assert!(matches!(err, StatusError::Validation(_)));

    let options = IssueOptions {
        index_allocator: Some(AllocatorName::new("b").unwrap()),
        ..IssueOptions::default()
    };
    let vc = h.issuer.issue(credential(), options).await.unwrap();
    assert_eq!(vc["credentialStatus"]["statusPurpose"], "suspension");
    assert_eq!(
        vc["credentialStatus"]["statusListCredential"],
        "https://status.example/b/0"
    );
}

// =========================================================================
// Recovery
// =========================================================================

#[tokio::test]
async fn failed_signing_resumes_with_the_same_slot() {
    let signer = FlakySigner {
        inner: ed25519(),
        failures: 1,
        calls: AtomicUsize::new(0),
    };
    let config = IssuerConfig::new(ISSUER).with_status_list(list_config(
        "main",
        vec![StatusPurpose::Revocation],
        8,
        None,
    ));
    let h = harness(config, Arc::new(signer));
    let id = CredentialId::new("urn:uuid:flaky").unwrap();

    let err = h
        .issuer
        .issue(credential(), with_id("urn:uuid:flaky"))
        .await
        .unwrap_err();
    assert!(matches!(err, StatusError::Signing(_)));
    let failed = h.issuer.record(&id).await.unwrap().unwrap();
    assert_eq!(failed.state, IssuanceState::Failed);
    let reserved = failed.assignment.clone().expect("slot reserved before signing");

    // Another credential takes the next slot meanwhile.
    let other = h.issuer.issue(credential(), IssueOptions::default()).await.unwrap();
    assert_eq!(other["credentialStatus"]["statusListIndex"], "1");

    let vc = h
        .issuer
        .issue(credential(), with_id("urn:uuid:flaky"))
        .await
        .unwrap();
    assert_eq!(vc["credentialStatus"]["statusListIndex"], "0");
    let issued = h.issuer.record(&id).await.unwrap().unwrap();
    assert_eq!(issued.state, IssuanceState::Issued);
    assert_eq!(issued.assignment, Some(reserved));
    assert_eq!(issued.attempts, 2);
}

#[tokio::test]
async fn abandoned_pending_record_is_taken_over_after_lease() {
    let h = revocation_harness(8, None);
    let id = CredentialId::new("urn:uuid:abandoned").unwrap();
    let mut stale = CredentialRecord::pending(id.clone(), credential());
    stale.updated_at = Utc::now() - Duration::minutes(10);
    h.documents.insert(stale).await.unwrap();

    let vc = h
        .issuer
        .issue(credential(), with_id("urn:uuid:abandoned"))
        .await
        .unwrap();
    let record = h.issuer.record(&id).await.unwrap().unwrap();
    assert_eq!(record.state, IssuanceState::Issued);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.document, vc);
    // credentialId keys the record; it is not written into the document.
    assert!(vc.get("id").is_none());
}

#[tokio::test]
async fn fresh_pending_record_is_a_duplicate() {
    let h = revocation_harness(8, None);
    let id = CredentialId::new("urn:uuid:in-flight").unwrap();
    h.documents
        .insert(CredentialRecord::pending(id, credential()))
        .await
        .unwrap();

    let err = h
        .issuer
        .issue(credential(), with_id("urn:uuid:in-flight"))
        .await
        .unwrap_err();
    assert!(matches!(err, StatusError::Duplicate { .. }));
}
