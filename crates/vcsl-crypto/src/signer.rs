//! # Signer Collaborator
//!
//! [`Signer`] is the narrow interface the issuance coordinator and the
//! status list publisher call to obtain a proof. Signing is the only
//! long-running call in the engine, so the trait is async and callers must
//! not hold any lock across it.

use async_trait::async_trait;
use serde_json::Value;
use vcsl_core::{CanonicalBytes, StatusError};

use crate::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;
use crate::proof::{Proof, ED25519_SIGNATURE_2020};

/// Everything a signer receives for one signing operation.
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    /// JCS bytes of the document, proof excluded.
    pub payload: &'a CanonicalBytes,
    /// Selective-disclosure mandatory pointers, already validated.
    pub mandatory_pointers: &'a [String],
    /// Opaque bytes passed through from the issue request unmodified.
    pub extra_information: Option<&'a [u8]>,
}

impl<'a> SignRequest<'a> {
    /// A plain request with no selective-disclosure options.
    pub fn plain(payload: &'a CanonicalBytes) -> Self {
        Self {
            payload,
            mandatory_pointers: &[],
            extra_information: None,
        }
    }
}

/// Produces proofs over canonical payloads.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Failures are reported as [`StatusError::Signing`].
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign the payload and return the proof to attach.
    async fn sign(&self, request: SignRequest<'_>) -> Result<Proof, StatusError>;

    /// URL identifying the key this signer uses.
    fn verification_method(&self) -> &str;

    /// Whether this signer's suite understands `mandatoryPointers`.
    fn supports_selective_disclosure(&self) -> bool {
        false
    }
}

/// In-process Ed25519 signer producing `Ed25519Signature2020` proofs.
#[derive(Debug)]
pub struct Ed25519Signer {
    key: Ed25519KeyPair,
    verification_method: String,
}

impl Ed25519Signer {
    pub fn new(key: Ed25519KeyPair, verification_method: impl Into<String>) -> Self {
        Self {
            key,
            verification_method: verification_method.into(),
        }
    }

    /// The public key matching this signer's proofs.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.key.public_key()
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    async fn sign(&self, request: SignRequest<'_>) -> Result<Proof, StatusError> {
        if !request.mandatory_pointers.is_empty() {
            return Err(StatusError::Signing(format!(
                "{ED25519_SIGNATURE_2020} does not support selective disclosure"
            )));
        }
        let signature = self.key.sign(request.payload);
        tracing::trace!(
            verification_method = %self.verification_method,
            payload_len = request.payload.len(),
            "signed payload"
        );
        Ok(Proof::ed25519(
            self.verification_method.clone(),
            signature.to_hex(),
        ))
    }

    fn verification_method(&self) -> &str {
        &self.verification_method
    }
}

/// Verify the `Ed25519Signature2020` proof on a signed JSON document.
///
/// Recomputes the signing input (document with `proof` removed) and checks
/// the signature against `public_key`.
pub fn verify_document(document: &Value, public_key: &Ed25519PublicKey) -> Result<(), CryptoError> {
    let proof = document
        .get("proof")
        .ok_or_else(|| CryptoError::InvalidProof("document has no proof".to_string()))?;
    let proof: Proof = serde_json::from_value(proof.clone())
        .map_err(|e| CryptoError::InvalidProof(e.to_string()))?;
    if proof.proof_type != ED25519_SIGNATURE_2020 {
        return Err(CryptoError::InvalidProof(format!(
            "unsupported proof type {:?}",
            proof.proof_type
        )));
    }
    let signature = Ed25519Signature::from_hex(&proof.proof_value)?;
    let input = CanonicalBytes::signing_input(document)?;
    public_key.verify(&input, &signature)
}
