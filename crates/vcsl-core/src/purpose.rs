//! # Status Purpose
//!
//! The independent bit-plane a status bit lives in. `revocation` and
//! `suspension` are first-class; anything else is carried verbatim so new
//! purposes need no code change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StatusError;

/// Semantic meaning of a status bit.
///
/// Serializes as its lowercase name (`"revocation"`, `"suspension"`, or the
/// custom string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatusPurpose {
    /// Bit set means the credential is permanently revoked.
    Revocation,
    /// Bit set means the credential is temporarily suspended.
    Suspension,
    /// Any other purpose name.
    Other(String),
}

impl StatusPurpose {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Revocation => "revocation",
            Self::Suspension => "suspension",
            Self::Other(s) => s,
        }
    }
}

impl FromStr for StatusPurpose {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revocation" => Ok(Self::Revocation),
            "suspension" => Ok(Self::Suspension),
            "" => Err(StatusError::validation("statusPurpose must not be empty")),
            other if other.contains('/') || other.chars().any(char::is_whitespace) => {
                Err(StatusError::validation(format!(
                    "statusPurpose {other:?} must not contain '/' or whitespace"
                )))
            }
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

impl TryFrom<String> for StatusPurpose {
    type Error = StatusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StatusPurpose> for String {
    fn from(p: StatusPurpose) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
