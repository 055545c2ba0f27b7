//! # vcsl-core — Foundational Types for the Status Engine
//!
//! The leaf of the workspace DAG. Every other `vcsl-*` crate depends on it;
//! it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **One error taxonomy.** [`StatusError`] carries one variant per error
//!    kind the engine can surface. [`StatusError::kind()`] gives callers a
//!    stable machine-readable code without string matching.
//!
//! 2. **`CanonicalBytes` newtype.** Everything that gets signed (issued
//!    credentials, status list credentials) flows through
//!    [`CanonicalBytes::new()`]. Signers only accept `&CanonicalBytes`.
//!
//! 3. **Newtype identifiers.** [`AllocatorName`], [`CredentialId`] and
//!    [`ListId`] cannot be confused with each other or with bare strings.
//!
//! 4. **Open purpose enumeration.** [`StatusPurpose`] has first-class
//!    variants for `revocation` and `suspension` and an escape hatch for
//!    any other purpose string.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vcsl-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod error;
pub mod identity;
pub mod purpose;

pub use canonical::CanonicalBytes;
pub use error::{CanonicalizationError, ErrorKind, StatusError};
pub use identity::{AllocatorName, CredentialId, ListId, ShardKey};
pub use purpose::StatusPurpose;
