//! # Cryptographic Error Types

use thiserror::Error;

/// Errors from key handling and signature verification.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("Ed25519 verification failed: {0}")]
    VerificationFailed(String),

    /// Key parsing failed.
    #[error("key error: {0}")]
    KeyError(String),

    /// The document carries no proof, or the proof is malformed.
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    /// Canonicalization of the signed document failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] vcsl_core::CanonicalizationError),
}
