//! # Error Types — Structured Error Taxonomy
//!
//! Defines the error types used throughout the status engine. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Every variant carries the identifiers a caller needs to act on it
//!   (credential id, allocator, purpose, list id, offending pointer).
//! - `Conflict` is transient. It is produced only by versioned
//!   compare-and-set writes and is absorbed by bounded retry loops; once
//!   the bound is exhausted callers see `Contention` instead.
//! - [`ErrorKind`] is the stable, machine-readable classification.

use std::fmt;

use thiserror::Error;

/// Top-level error type for the status engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// Malformed input shape (missing field, wrong JSON type).
    #[error("validation error: {0}")]
    Validation(String),

    /// Semantically invalid input. Carries the offending value.
    #[error("data error: {message} (offending value: {value:?})")]
    Data {
        /// What was wrong.
        message: String,
        /// The value that caused it, e.g. an unresolvable JSON Pointer.
        value: String,
    },

    /// A credential with this id already exists for the configuration.
    #[error("duplicate credential: {credential_id:?} already exists")]
    Duplicate {
        /// The colliding credential id.
        credential_id: String,
    },

    /// The allocator cannot open another status list.
    #[error(
        "status list quota exceeded for allocator {allocator:?} ({purpose}): \
         all {list_count} lists are in use"
    )]
    QuotaExceeded {
        /// Allocator whose quota is exhausted.
        allocator: String,
        /// Purpose that needed a new list.
        purpose: String,
        /// The configured `listCount`.
        list_count: u64,
    },

    /// Unknown credential, assignment, allocator or list.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-supplied status reference does not match stored state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Optimistic-concurrency collision on a versioned record.
    #[error("version conflict on {resource}: expected version {expected}, found {actual}")]
    Conflict {
        /// The record that moved underneath the writer.
        resource: String,
        /// Version the writer read.
        expected: u64,
        /// Version found at write time.
        actual: u64,
    },

    /// Authorization denied by the external authorizer.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// The external signer failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A bounded retry loop gave up after repeated conflicts.
    #[error("gave up on {resource} after {attempts} conflicting attempts")]
    Contention {
        /// The contended record.
        resource: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// Persistence backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Machine-readable classification of a [`StatusError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Data,
    Duplicate,
    QuotaExceeded,
    NotFound,
    InvalidState,
    Conflict,
    NotAllowed,
    Signing,
    Contention,
    Storage,
}

impl ErrorKind {
    /// Stable error code for wire representations.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Data => "DATA_ERROR",
            Self::Duplicate => "DUPLICATE_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED_ERROR",
            Self::NotFound => "NOT_FOUND_ERROR",
            Self::InvalidState => "INVALID_STATE_ERROR",
            Self::Conflict => "CONFLICT_ERROR",
            Self::NotAllowed => "NOT_ALLOWED_ERROR",
            Self::Signing => "SIGNING_ERROR",
            Self::Contention => "CONTENTION_ERROR",
            Self::Storage => "STORAGE_ERROR",
        }
    }

    /// Whether a caller could reasonably retry the same request later.
    ///
    /// Only operational conditions qualify; every input or state error is
    /// permanent for that request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention | Self::Storage)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl StatusError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Data { .. } => ErrorKind::Data,
            Self::Duplicate { .. } => ErrorKind::Duplicate,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotAllowed(_) => ErrorKind::NotAllowed,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Contention { .. } => ErrorKind::Contention,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Construct a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Construct a data error carrying the offending value.
    pub fn data(msg: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Data {
            message: msg.into(),
            value: value.into(),
        }
    }

    /// Construct a version conflict.
    pub fn conflict(resource: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            resource: resource.into(),
            expected,
            actual,
        }
    }

    /// Whether this is a transient optimistic-concurrency collision.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Signing input must be a JSON object.
    #[error("signing input must be a JSON object")]
    NotAnObject,

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

impl From<CanonicalizationError> for StatusError {
    fn from(err: CanonicalizationError) -> Self {
        Self::Validation(err.to_string())
    }
}
