//! # Proof Objects
//!
//! The proof structure attached to issued credentials and to published
//! status list credentials. The engine treats proofs as opaque output of
//! the [`Signer`](crate::Signer); only the Ed25519 signer in this crate
//! knows how to produce and check `proofValue`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Proof type name produced by [`Ed25519Signer`](crate::Ed25519Signer).
pub const ED25519_SIGNATURE_2020: &str = "Ed25519Signature2020";

/// The purpose of a proof, per the Data Integrity vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProofPurpose {
    /// The issuer asserts the credential claims are true.
    AssertionMethod,
    /// Authentication of the credential holder.
    Authentication,
}

/// A cryptographic proof on a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    /// Proof type, e.g. `Ed25519Signature2020` or `DataIntegrityProof`.
    #[serde(rename = "type")]
    pub proof_type: String,

    /// Cryptosuite name for `DataIntegrityProof` style proofs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cryptosuite: Option<String>,

    /// When the proof was created (UTC, seconds precision).
    #[serde(with = "seconds")]
    pub created: DateTime<Utc>,

    /// URL identifying the signing key.
    pub verification_method: String,

    pub proof_purpose: ProofPurpose,

    /// Encoded signature bytes.
    pub proof_value: String,
}

impl Proof {
    /// Create an `Ed25519Signature2020` assertion proof created now.
    pub fn ed25519(verification_method: impl Into<String>, proof_value: impl Into<String>) -> Self {
        Self {
            proof_type: ED25519_SIGNATURE_2020.to_string(),
            cryptosuite: None,
            created: Utc::now(),
            verification_method: verification_method.into(),
            proof_purpose: ProofPurpose::AssertionMethod,
            proof_value: proof_value.into(),
        }
    }
}

/// Serialize timestamps as `YYYY-MM-DDTHH:MM:SSZ`.
mod seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Format a timestamp the way proofs and credentials carry it.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
