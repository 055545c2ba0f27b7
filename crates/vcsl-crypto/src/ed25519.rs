//! # Ed25519 Keys
//!
//! The default signing suite. Keys are loaded from a hex seed so a
//! deployment can pin its issuer key; signatures travel as lowercase hex
//! in `proofValue`.
//!
//! ## Security Invariant
//!
//! Only [`CanonicalBytes`] can be signed or verified, so every signature
//! covers a JCS-canonical document. The private half never leaves
//! [`Ed25519KeyPair`]: it has no `Serialize` impl and a redacted `Debug`.

use ed25519_dalek::{Signer as _, Verifier as _};
use vcsl_core::CanonicalBytes;

use crate::error::CryptoError;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey([u8; 32]);

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ed25519Signature([u8; 64]);

/// Issuer signing key.
pub struct Ed25519KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Ed25519PublicKey {
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        decode_hex::<32>(hex).map(Self).map_err(CryptoError::KeyError)
    }

    /// Check `signature` over `data`.
    pub fn verify(
        &self,
        data: &CanonicalBytes,
        signature: &Ed25519Signature,
    ) -> Result<(), CryptoError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::KeyError(format!("invalid public key: {e}")))?;
        key.verify(
            data.as_bytes(),
            &ed25519_dalek::Signature::from_bytes(&signature.0),
        )
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))
    }
}

impl std::fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519PublicKey({}..)", to_hex(&self.0[..4]))
    }
}

impl Ed25519Signature {
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        decode_hex::<64>(hex)
            .map(Self)
            .map_err(|e| CryptoError::InvalidProof(format!("proofValue: {e}")))
    }
}

impl std::fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signature({}..)", to_hex(&self.0[..4]))
    }
}

impl Ed25519KeyPair {
    /// Fresh key from the OS CSPRNG. Used when no seed is configured.
    pub fn generate() -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Parse a 64-character hex seed, as found in `VCSL_SIGNING_KEY`.
    pub fn from_seed_hex(hex: &str) -> Result<Self, CryptoError> {
        let seed = decode_hex::<32>(hex).map_err(CryptoError::KeyError)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, data: &CanonicalBytes) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(data.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Ed25519KeyPair(<private>)")
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex<const N: usize>(hex: &str) -> Result<[u8; N], String> {
    let hex = hex.trim();
    if hex.len() != N * 2 || !hex.is_ascii() {
        return Err(format!("expected {} hex chars, got {}", N * 2, hex.len()));
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| format!("bad hex at offset {}: {e}", i * 2))?;
    }
    Ok(out)
}
