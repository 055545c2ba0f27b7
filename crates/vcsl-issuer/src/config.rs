//! # Issuer Configuration

use chrono::Duration;
use vcsl_core::StatusError;
use vcsl_status::publisher::DEFAULT_TTL_SECS;
use vcsl_status::{RetryPolicy, StatusListConfig};

/// Default age after which a `Pending` record may be claimed by a retry.
pub const DEFAULT_PENDING_LEASE_SECS: i64 = 60;

/// Settings for one [`Issuer`](crate::Issuer).
#[derive(Debug, Clone, PartialEq)]
pub struct IssuerConfig {
    /// Issuer id written into credentials lacking one and into status
    /// list credentials.
    pub issuer: String,
    /// Provisioned status list configurations, one allocator each.
    pub status_lists: Vec<StatusListConfig>,
    /// Compare-and-set attempts before giving up with `Contention`.
    pub max_retries: u32,
    /// How long a `Pending` record belongs to the attempt that wrote it.
    pub pending_lease: Duration,
    /// Validity window of published status list credentials.
    pub status_list_ttl: Duration,
}

impl IssuerConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            status_lists: Vec::new(),
            max_retries: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            pending_lease: Duration::seconds(DEFAULT_PENDING_LEASE_SECS),
            status_list_ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    pub fn with_status_list(mut self, config: StatusListConfig) -> Self {
        self.status_lists.push(config);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_pending_lease(mut self, lease: Duration) -> Self {
        self.pending_lease = lease;
        self
    }

    pub fn with_status_list_ttl(mut self, ttl: Duration) -> Self {
        self.status_list_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), StatusError> {
        if self.issuer.trim().is_empty() {
            return Err(StatusError::validation("issuer id must not be empty"));
        }
        if self.pending_lease < Duration::zero() || self.status_list_ttl <= Duration::zero() {
            return Err(StatusError::validation(
                "pending lease must be non-negative and status list ttl positive",
            ));
        }
        for config in &self.status_lists {
            config.validate()?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }
}
