//! # Status Engine
//!
//! Wires one store, one signer and the provisioned configurations into the
//! allocator registry, publisher and update service that share them.

use std::sync::Arc;

use chrono::Duration;
use vcsl_core::StatusError;
use vcsl_crypto::Signer;

use crate::config::StatusListConfig;
use crate::publisher::StatusListPublisher;
use crate::registry::AllocatorRegistry;
use crate::retry::RetryPolicy;
use crate::store::StatusStore;
use crate::update::StatusUpdateService;

/// The status list components of one issuer, sharing one store.
#[derive(Debug, Clone)]
pub struct StatusEngine {
    pub registry: Arc<AllocatorRegistry>,
    pub publisher: Arc<StatusListPublisher>,
    pub updates: Arc<StatusUpdateService>,
}

impl StatusEngine {
    pub fn new(
        issuer: impl Into<String>,
        configs: Vec<StatusListConfig>,
        store: Arc<dyn StatusStore>,
        signer: Arc<dyn Signer>,
        retry: RetryPolicy,
        ttl: Duration,
    ) -> Result<Self, StatusError> {
        let registry = Arc::new(AllocatorRegistry::new(configs, store, retry)?);
        let publisher = Arc::new(
            StatusListPublisher::new(issuer, Arc::clone(&registry), signer).with_ttl(ttl),
        );
        let updates = Arc::new(StatusUpdateService::new(
            Arc::clone(&registry),
            Arc::clone(&publisher),
        ));
        Ok(Self {
            registry,
            publisher,
            updates,
        })
    }
}
