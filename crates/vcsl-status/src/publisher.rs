//! # Status List Credential Publisher
//!
//! Materializes a shard into a signed `BitstringStatusListCredential`.
//!
//! Published artifacts are a pure function of shard state and are cached
//! per shard together with the version they were built from. A read
//! without `force_refresh` returns the cached artifact while its version
//! still matches the store; anything else regenerates.
//!
//! ## Single-flight
//!
//! Concurrent regenerations of the same `(shard, version)` share one
//! `OnceCell`, so exactly one signing call runs and every waiter receives
//! the same `Arc`. Forced and unforced reads fly separately: an unforced
//! flight may settle for a fresh cache entry, a forced one always signs.
//! No lock is held while the signer runs.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use vcsl_core::{CanonicalBytes, ShardKey, StatusError};
use vcsl_crypto::{format_timestamp, SignRequest, Signer};

use crate::bitstring::Bitstring;
use crate::registry::AllocatorRegistry;

/// Default validity window of a published status list credential.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// VC Data Model 2.0 base context.
pub const CREDENTIALS_V2_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";

/// A signed status list credential built from one shard version.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedStatusList {
    pub key: ShardKey,
    /// Shard version the bits were read at.
    pub version: u64,
    /// The signed credential.
    pub credential: Value,
}

impl PublishedStatusList {
    pub fn encoded_list(&self) -> Result<&str, StatusError> {
        self.credential
            .pointer("/credentialSubject/encodedList")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StatusError::data(
                    "status list credential has no encodedList",
                    self.key.to_string(),
                )
            })
    }

    /// Read bit `index` back out of the published `encodedList`.
    pub fn status_at(&self, index: u64) -> Result<bool, StatusError> {
        Bitstring::decode(self.encoded_list()?, None)?.get(index)
    }
}

type Flight = Arc<OnceCell<Arc<PublishedStatusList>>>;

/// Shard, version, and whether the flight forces a re-sign.
type FlightKey = (ShardKey, u64, bool);

/// Builds, signs and caches status list credentials.
pub struct StatusListPublisher {
    issuer: String,
    registry: Arc<AllocatorRegistry>,
    signer: Arc<dyn Signer>,
    ttl: Duration,
    cache: DashMap<ShardKey, Arc<PublishedStatusList>>,
    inflight: DashMap<FlightKey, Flight>,
}

impl std::fmt::Debug for StatusListPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusListPublisher")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl StatusListPublisher {
    pub fn new(
        issuer: impl Into<String>,
        registry: Arc<AllocatorRegistry>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            registry,
            signer,
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
            cache: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Override the `validUntil` window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Return the signed status list credential for a shard.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the allocator is unknown or the list was never
    ///   opened.
    /// - `Signing` if the signer fails. Nothing is cached in that case.
    pub async fn get_published(
        &self,
        key: &ShardKey,
        force_refresh: bool,
    ) -> Result<Arc<PublishedStatusList>, StatusError> {
        let allocator = self.registry.get(&key.allocator)?;
        if !allocator.config().owns_list(&key.purpose, key.list_id) {
            return Err(StatusError::NotFound(format!("status list {key}")));
        }
        let current = allocator
            .store()
            .shard_version(key)
            .await?
            .ok_or_else(|| StatusError::NotFound(format!("status list {key}")))?;

        if !force_refresh {
            if let Some(hit) = self.fresh(key, current) {
                tracing::trace!(shard = %key, version = current, "status list cache hit");
                return Ok(hit);
            }
        }

        let flight_key = (key.clone(), current, force_refresh);
        let flight = self.flight(&flight_key);
        let result = flight
            .get_or_try_init(move || async move {
                if !force_refresh {
                    if let Some(hit) = self.fresh(key, current) {
                        return Ok(hit);
                    }
                }
                self.regenerate(key).await
            })
            .await
            .cloned();
        self.inflight
            .remove_if(&flight_key, |_, cell| Arc::ptr_eq(cell, &flight));
        result
    }

    fn flight(&self, flight_key: &FlightKey) -> Flight {
        Arc::clone(self.inflight.entry(flight_key.clone()).or_default().value())
    }

    /// Drop the cached artifact for a shard.
    pub fn invalidate(&self, key: &ShardKey) {
        if self.cache.remove(key).is_some() {
            tracing::debug!(shard = %key, "status list cache entry invalidated");
        }
    }

    /// The cached artifact, regardless of freshness.
    pub fn cached(&self, key: &ShardKey) -> Option<Arc<PublishedStatusList>> {
        self.cache.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn fresh(&self, key: &ShardKey, version: u64) -> Option<Arc<PublishedStatusList>> {
        self.cache
            .get(key)
            .filter(|entry| entry.version == version)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn regenerate(&self, key: &ShardKey) -> Result<Arc<PublishedStatusList>, StatusError> {
        let allocator = self.registry.get(&key.allocator)?;
        let config = allocator.config();
        let shard = allocator.store().get_shard(key, config.capacity()).await?;
        let encoded = shard.value.encode()?;

        let url = config.list_url(&key.purpose, key.list_id);
        let valid_from = Utc::now();
        let mut credential = json!({
            "@context": [CREDENTIALS_V2_CONTEXT],
            "id": url,
            "type": ["VerifiableCredential", "BitstringStatusListCredential"],
            "issuer": self.issuer,
            "validFrom": format_timestamp(&valid_from),
            "validUntil": format_timestamp(&(valid_from + self.ttl)),
            "credentialSubject": {
                "id": format!("{url}#list"),
                "type": "BitstringStatusList",
                "statusPurpose": key.purpose.as_str(),
                "encodedList": encoded,
            },
        });

        let payload = CanonicalBytes::signing_input(&credential)?;
        let proof = self.signer.sign(SignRequest::plain(&payload)).await?;
        credential["proof"] =
            serde_json::to_value(&proof).map_err(|e| StatusError::Signing(e.to_string()))?;

        let published = Arc::new(PublishedStatusList {
            key: key.clone(),
            version: shard.version,
            credential,
        });
        self.cache
            .entry(key.clone())
            .and_modify(|cached| {
                if cached.version <= published.version {
                    *cached = Arc::clone(&published);
                }
            })
            .or_insert_with(|| Arc::clone(&published));

        metrics::counter!(
            "vcsl_status_list_regenerations_total",
            "allocator" => key.allocator.to_string()
        )
        .increment(1);
        tracing::info!(
            allocator = %key.allocator,
            purpose = %key.purpose,
            list_id = %key.list_id,
            version = shard.version,
            "published status list"
        );
        Ok(published)
    }
}
