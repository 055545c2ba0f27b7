//! # vcsl-status — Status List Allocation and Mutation Engine
//!
//! Assigns every credential a unique bit in a size-bounded status list,
//! rolls over to new lists under concurrent load, applies status flips,
//! and republishes signed status list credentials on demand.
//!
//! ## Components (leaves first)
//!
//! - [`IndexAllocator`]: unique `(listId, index)` per credential and
//!   purpose, under a `listCount` quota.
//! - [`StatusStore`]: versioned compare-and-set storage for allocator
//!   cursors and shard bits. [`MemoryStatusStore`] is the in-process
//!   implementation.
//! - [`StatusUpdateService`]: validates a caller's `credentialStatus`
//!   against the recorded assignment and flips the bit.
//! - [`StatusListPublisher`]: cached, single-flight signing of
//!   `BitstringStatusListCredential`s.
//!
//! ## Shared-State Invariant
//!
//! Allocator cursors and shard bit arrays are the only mutable shared
//! state. Nothing outside a [`StatusStore`] implementation touches them,
//! and every mutation is a versioned compare-and-set retried under a
//! bounded [`RetryPolicy`].
//!
//! ## Crate Policy
//!
//! - Depends on `vcsl-core` and `vcsl-crypto` only.
//! - No lock is held across an `.await`.

pub mod allocator;
pub mod assignment;
pub mod bitstring;
pub mod config;
pub mod engine;
pub mod memory;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod store;
pub mod update;

pub use allocator::IndexAllocator;
pub use assignment::{CredentialStatusAssignment, StatusSlot};
pub use bitstring::Bitstring;
pub use config::{
    BitstringStatusListConfig, ListConfig, StatusListConfig, TerseBitstringStatusListConfig,
};
pub use engine::StatusEngine;
pub use memory::MemoryStatusStore;
pub use publisher::{PublishedStatusList, StatusListPublisher, CREDENTIALS_V2_CONTEXT};
pub use registry::AllocatorRegistry;
pub use retry::RetryPolicy;
pub use store::{AllocationCommit, AllocatorCursor, CommitOutcome, OpenShard, StatusStore, Versioned};
pub use update::{StatusDescriptor, StatusUpdateService};
