//! # Application State
//!
//! Shared state for the Axum application, passed to route handlers via
//! the `State` extractor. Cloning is cheap: everything is behind `Arc`.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use vcsl_crypto::{Ed25519KeyPair, Ed25519Signer};
use vcsl_issuer::{Issuer, MemoryDocumentStore};
use vcsl_status::MemoryStatusStore;

use crate::auth::{AllowAll, Authorizer, BearerTokenAuthorizer};
use crate::config::ServiceConfig;

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<Issuer>,
    pub authorizer: Arc<dyn Authorizer>,
    /// Renders `/metrics`. `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("issuer", &self.issuer)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(issuer: Arc<Issuer>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            issuer,
            authorizer,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Wire an issuer over in-memory stores from service configuration.
    pub fn from_config(config: &ServiceConfig, key: Ed25519KeyPair) -> anyhow::Result<Self> {
        let verification_method = format!("{}#key-1", config.issuer_id);
        let signer = Arc::new(Ed25519Signer::new(key, verification_method));
        let issuer = Issuer::new(
            config.issuer_config(),
            Arc::new(MemoryStatusStore::new()),
            Arc::new(MemoryDocumentStore::new()),
            signer,
        )?;

        let authorizer: Arc<dyn Authorizer> = match &config.auth_token {
            Some(token) => Arc::new(BearerTokenAuthorizer::new(token.clone())),
            None => {
                tracing::warn!("VCSL_AUTH_TOKEN not set, all requests are authorized");
                Arc::new(AllowAll)
            }
        };
        Ok(Self::new(Arc::new(issuer), authorizer))
    }
}
