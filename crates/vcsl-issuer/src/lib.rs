//! # vcsl-issuer — Credential Issuance
//!
//! Turns an unsigned credential into a signed one bound to status list
//! bits. The [`Issuer`] owns the issuance flow; the allocation, publication
//! and status update machinery it drives lives in `vcsl-status`.
//!
//! ## Security Invariant
//!
//! A credential id is issued at most once. Records are created with a
//! create-only insert and advanced with revision-checked updates, so two
//! concurrent requests for the same id can never both sign.
//!
//! ## Crate Policy
//!
//! - No `unwrap()` outside tests.
//! - Nothing is persisted or allocated before the request has been fully
//!   validated.

pub mod config;
pub mod coordinator;
pub mod credential;
pub mod document;
pub mod entry;
pub mod options;
pub mod pointer;
pub mod record;

pub use config::{IssuerConfig, DEFAULT_PENDING_LEASE_SECS};
pub use coordinator::Issuer;
pub use credential::{
    ensure_context, validate_credential, VcVersion, CREDENTIALS_V1_CONTEXT,
    STATUS_LIST_2021_CONTEXT,
};
pub use document::{DocumentStore, MemoryDocumentStore};
pub use entry::{embed_status, status_entries};
pub use options::IssueOptions;
pub use pointer::check_mandatory_pointers;
pub use record::{CredentialRecord, IssuanceState};
