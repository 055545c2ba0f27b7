//! # vcsl-crypto — Signing Collaborators
//!
//! The status engine never implements a signature suite itself; it calls a
//! [`Signer`] and attaches whatever [`Proof`] comes back. This crate defines
//! that seam and ships one real implementation:
//!
//! - **Ed25519** key pairs, signatures, and verification over
//!   [`CanonicalBytes`](vcsl_core::CanonicalBytes).
//! - **[`Proof`]**, the W3C data-integrity style proof object.
//! - **[`Ed25519Signer`]**, a [`Signer`] backed by an in-process key.
//!
//! ## Crate Policy
//!
//! - Depends only on `vcsl-core` internally.
//! - No mocking of cryptographic operations in tests. Tests use real
//!   Ed25519 over real canonical bytes.

pub mod ed25519;
pub mod error;
pub mod proof;
pub mod signer;

pub use ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use error::CryptoError;
pub use proof::{format_timestamp, Proof, ProofPurpose, ED25519_SIGNATURE_2020};
pub use signer::{verify_document, Ed25519Signer, SignRequest, Signer};
