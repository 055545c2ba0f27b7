//! # Status List Configuration
//!
//! Tagged configuration variants, validated once at construction.
//!
//! A configuration owns exactly one index allocator. The `type` tag picks
//! the layout:
//!
//! - `BitstringStatusList`: one `(listId, index)` slot per purpose, list
//!   URLs of the form `<baseUrl>/<listId>`.
//! - `TerseBitstringStatusList`: a single integer `terseIndex` per
//!   credential. Each purpose owns a carved range of `listCount` lists and
//!   list URLs are `<baseUrl>/<purpose>/<listIndex>`.
//!
//! ```yaml
//! type: BitstringStatusList
//! indexAllocator: employee-badges
//! baseUrl: https://status.example.com/lists
//! statusPurposes: [revocation, suspension]
//! listConfig: { blockSize: 8192, blockCount: 16, listCount: 100 }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vcsl_core::{AllocatorName, ListId, StatusError, StatusPurpose};

use crate::assignment::{CredentialStatusAssignment, StatusSlot};

/// Largest shard a single list may hold, in bits.
pub const MAX_SHARD_CAPACITY: u64 = 1 << 24;

/// Shard geometry for one allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawListConfig")]
pub struct ListConfig {
    block_size: u64,
    block_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    list_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListConfig {
    block_size: u64,
    block_count: u64,
    #[serde(default)]
    list_count: Option<u64>,
}

impl TryFrom<RawListConfig> for ListConfig {
    type Error = StatusError;

    fn try_from(raw: RawListConfig) -> Result<Self, Self::Error> {
        Self::new(raw.block_size, raw.block_count, raw.list_count)
    }
}

impl ListConfig {
    /// Validate and build a list configuration.
    ///
    /// `list_count` of `None` means the allocator may open lists without
    /// bound.
    pub fn new(
        block_size: u64,
        block_count: u64,
        list_count: Option<u64>,
    ) -> Result<Self, StatusError> {
        if block_size == 0 || block_count == 0 {
            return Err(StatusError::validation(
                "listConfig blockSize and blockCount must be positive",
            ));
        }
        let capacity = block_size.checked_mul(block_count).ok_or_else(|| {
            StatusError::validation("listConfig capacity overflows a 64-bit index")
        })?;
        if capacity > MAX_SHARD_CAPACITY {
            return Err(StatusError::validation(format!(
                "listConfig capacity {capacity} exceeds the {MAX_SHARD_CAPACITY} bit maximum"
            )));
        }
        if list_count == Some(0) {
            return Err(StatusError::validation("listConfig listCount must be positive"));
        }
        Ok(Self {
            block_size,
            block_count,
            list_count,
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Maximum number of lists, if bounded.
    pub fn list_count(&self) -> Option<u64> {
        self.list_count
    }

    /// Bits per list: `blockSize × blockCount`.
    pub fn capacity(&self) -> u64 {
        self.block_size * self.block_count
    }
}

/// Full (one slot per purpose) status list configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitstringStatusListConfig {
    pub index_allocator: AllocatorName,
    pub base_url: String,
    pub status_purposes: Vec<StatusPurpose>,
    pub list_config: ListConfig,
}

/// Terse (single shared index) status list configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerseBitstringStatusListConfig {
    pub index_allocator: AllocatorName,
    pub base_url: String,
    pub status_purposes: Vec<StatusPurpose>,
    pub list_config: ListConfig,
}

/// A status list configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatusListConfig {
    #[serde(rename = "BitstringStatusList")]
    Bitstring(BitstringStatusListConfig),
    #[serde(rename = "TerseBitstringStatusList")]
    Terse(TerseBitstringStatusListConfig),
}

impl StatusListConfig {
    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), StatusError> {
        let purposes = self.status_purposes();
        if purposes.is_empty() {
            return Err(StatusError::validation(format!(
                "status list configuration {:?} has no statusPurposes",
                self.index_allocator().as_str()
            )));
        }
        let unique: BTreeSet<&StatusPurpose> = purposes.iter().collect();
        if unique.len() != purposes.len() {
            return Err(StatusError::validation(format!(
                "status list configuration {:?} repeats a status purpose",
                self.index_allocator().as_str()
            )));
        }
        let base = self.base_url();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(StatusError::validation(format!(
                "baseUrl {base:?} must be an http(s) URL"
            )));
        }
        if let Self::Terse(_) = self {
            let list_count = self.list_config().list_count().ok_or_else(|| {
                StatusError::validation("terse status lists require listConfig.listCount")
            })?;
            list_count
                .checked_mul(purposes.len() as u64)
                .and_then(|n| n.checked_mul(self.list_config().capacity()))
                .ok_or_else(|| {
                    StatusError::validation("terse index space overflows a 64-bit index")
                })?;
        }
        Ok(())
    }

    pub fn index_allocator(&self) -> &AllocatorName {
        match self {
            Self::Bitstring(c) => &c.index_allocator,
            Self::Terse(c) => &c.index_allocator,
        }
    }

    /// Base URL with any trailing `/` removed.
    pub fn base_url(&self) -> &str {
        let raw = match self {
            Self::Bitstring(c) => &c.base_url,
            Self::Terse(c) => &c.base_url,
        };
        raw.trim_end_matches('/')
    }

    pub fn status_purposes(&self) -> &[StatusPurpose] {
        match self {
            Self::Bitstring(c) => &c.status_purposes,
            Self::Terse(c) => &c.status_purposes,
        }
    }

    pub fn list_config(&self) -> &ListConfig {
        match self {
            Self::Bitstring(c) => &c.list_config,
            Self::Terse(c) => &c.list_config,
        }
    }

    pub fn is_terse(&self) -> bool {
        matches!(self, Self::Terse(_))
    }

    pub fn capacity(&self) -> u64 {
        self.list_config().capacity()
    }

    /// Position of `purpose` in the configured order.
    pub fn ordinal(&self, purpose: &StatusPurpose) -> Option<usize> {
        self.status_purposes().iter().position(|p| p == purpose)
    }

    /// Lists each purpose owns in terse mode.
    fn terse_list_count(&self) -> u64 {
        self.list_config().list_count().unwrap_or(1)
    }

    /// Size of the shared terse index space.
    pub fn terse_index_space(&self) -> u64 {
        self.terse_list_count() * self.capacity()
    }

    /// Map a terse index onto the internal slot for one purpose.
    pub fn terse_slot(&self, terse_index: u64, purpose: &StatusPurpose) -> Option<StatusSlot> {
        let ordinal = self.ordinal(purpose)? as u64;
        let capacity = self.capacity();
        let list_index = terse_index / capacity;
        if list_index >= self.terse_list_count() {
            return None;
        }
        Some(StatusSlot {
            list_id: ListId(ordinal * self.terse_list_count() + list_index),
            index: terse_index % capacity,
        })
    }

    /// Resolve the slot an assignment holds for `purpose`.
    pub fn resolve_slot(
        &self,
        assignment: &CredentialStatusAssignment,
        purpose: &StatusPurpose,
    ) -> Option<StatusSlot> {
        match assignment {
            CredentialStatusAssignment::Full { entries } => entries.get(purpose).copied(),
            CredentialStatusAssignment::Terse { terse_index } => {
                self.terse_slot(*terse_index, purpose)
            }
        }
    }

    /// Whether `list_id` is a list `purpose` may ever own.
    pub fn owns_list(&self, purpose: &StatusPurpose, list_id: ListId) -> bool {
        let Some(ordinal) = self.ordinal(purpose) else {
            return false;
        };
        match self {
            Self::Bitstring(_) => self
                .list_config()
                .list_count()
                .map_or(true, |limit| list_id.get() < limit),
            Self::Terse(_) => list_id.get() / self.terse_list_count() == ordinal as u64,
        }
    }

    /// Public URL of the status list credential for a shard.
    pub fn list_url(&self, purpose: &StatusPurpose, list_id: ListId) -> String {
        match self {
            Self::Bitstring(_) => format!("{}/{}", self.base_url(), list_id),
            Self::Terse(_) => format!(
                "{}/{}/{}",
                self.base_url(),
                purpose,
                list_id.get() % self.terse_list_count()
            ),
        }
    }

    /// Inverse of [`list_url`](Self::list_url): the internal list id behind
    /// the trailing segment of a published URL.
    pub fn shard_for_url(&self, purpose: &StatusPurpose, url_list_id: u64) -> Option<ListId> {
        let ordinal = self.ordinal(purpose)? as u64;
        let list_id = match self {
            Self::Bitstring(_) => ListId(url_list_id),
            Self::Terse(_) if url_list_id < self.terse_list_count() => {
                ListId(ordinal * self.terse_list_count() + url_list_id)
            }
            Self::Terse(_) => return None,
        };
        self.owns_list(purpose, list_id).then_some(list_id)
    }
}
