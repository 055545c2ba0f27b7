//! # Service Configuration
//!
//! Read once at startup from the environment. Status list configurations
//! come from a YAML file so they can be provisioned alongside the
//! deployment.
//!
//! ```yaml
//! - type: BitstringStatusList
//!   indexAllocator: main
//!   baseUrl: https://status.example.com/lists
//!   statusPurposes: [revocation, suspension]
//!   listConfig: { blockSize: 4096, blockCount: 32 }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use vcsl_crypto::Ed25519KeyPair;
use vcsl_issuer::IssuerConfig;
use vcsl_status::{RetryPolicy, StatusListConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("failed to read status list configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse status list configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Runtime settings for the HTTP service.
///
/// Custom `Debug` redacts the signing seed and the bearer secret.
#[derive(Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub issuer_id: String,
    /// Hex Ed25519 seed. `None` means a key is generated at startup.
    pub signing_key: Option<String>,
    pub status_lists: Vec<StatusListConfig>,
    /// Bearer secret. `None` disables authorization.
    pub auth_token: Option<String>,
    pub max_retries: u32,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field("issuer_id", &self.issuer_id)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .field("status_lists", &self.status_lists.len())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ServiceConfig {
    /// Load from process environment variables:
    ///
    /// - `VCSL_BIND_ADDR` (default `0.0.0.0:8080`)
    /// - `VCSL_ISSUER_ID` (required)
    /// - `VCSL_SIGNING_KEY` (64 hex chars; optional)
    /// - `VCSL_STATUS_CONFIG` (path to a YAML list; optional)
    /// - `VCSL_AUTH_TOKEN` (optional)
    /// - `VCSL_MAX_RETRIES` (default 8)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = var("VCSL_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "VCSL_BIND_ADDR",
                reason: e.to_string(),
            })?;
        let issuer_id = var("VCSL_ISSUER_ID").ok_or(ConfigError::Missing("VCSL_ISSUER_ID"))?;

        let signing_key = var("VCSL_SIGNING_KEY");
        if let Some(seed) = &signing_key {
            Ed25519KeyPair::from_seed_hex(seed).map_err(|e| ConfigError::Invalid {
                var: "VCSL_SIGNING_KEY",
                reason: e.to_string(),
            })?;
        }

        let status_lists = match var("VCSL_STATUS_CONFIG") {
            Some(path) => load_status_lists(Path::new(&path))?,
            None => Vec::new(),
        };

        let max_retries = match var("VCSL_MAX_RETRIES") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    var: "VCSL_MAX_RETRIES",
                    reason: format!("expected a positive integer, got {raw:?}"),
                })?,
            None => RetryPolicy::DEFAULT_MAX_ATTEMPTS,
        };

        Ok(Self {
            bind_addr,
            issuer_id,
            signing_key,
            status_lists,
            auth_token: var("VCSL_AUTH_TOKEN"),
            max_retries,
        })
    }

    pub fn issuer_config(&self) -> IssuerConfig {
        self.status_lists.iter().cloned().fold(
            IssuerConfig::new(self.issuer_id.clone()).with_max_retries(self.max_retries),
            IssuerConfig::with_status_list,
        )
    }

    /// The configured signing key, or a fresh one when none is set.
    pub fn signing_key(&self) -> Result<Ed25519KeyPair, ConfigError> {
        match &self.signing_key {
            Some(seed) => Ed25519KeyPair::from_seed_hex(seed).map_err(|e| ConfigError::Invalid {
                var: "VCSL_SIGNING_KEY",
                reason: e.to_string(),
            }),
            None => {
                tracing::warn!("VCSL_SIGNING_KEY not set, generated an ephemeral signing key");
                Ok(Ed25519KeyPair::generate())
            }
        }
    }
}

/// Parse and validate a YAML list of status list configurations.
pub fn load_status_lists(path: &Path) -> Result<Vec<StatusListConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let configs: Vec<StatusListConfig> = serde_yaml::from_str(&raw)?;
    for config in &configs {
        config.validate().map_err(|e| ConfigError::Invalid {
            var: "VCSL_STATUS_CONFIG",
            reason: e.to_string(),
        })?;
    }
    Ok(configs)
}
