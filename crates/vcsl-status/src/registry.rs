//! # Allocator Registry
//!
//! Named lookup of the allocators provisioned for a deployment. Each status
//! list configuration owns exactly one allocator, so allocator names must be
//! unique across configurations.

use std::collections::BTreeMap;
use std::sync::Arc;

use vcsl_core::{AllocatorName, StatusError};

use crate::allocator::IndexAllocator;
use crate::config::StatusListConfig;
use crate::retry::RetryPolicy;
use crate::store::StatusStore;

/// Allocators by name, in configuration order.
#[derive(Debug, Default)]
pub struct AllocatorRegistry {
    allocators: BTreeMap<AllocatorName, Arc<IndexAllocator>>,
    order: Vec<AllocatorName>,
}

impl AllocatorRegistry {
    /// Provision one allocator per configuration.
    pub fn new(
        configs: Vec<StatusListConfig>,
        store: Arc<dyn StatusStore>,
        retry: RetryPolicy,
    ) -> Result<Self, StatusError> {
        let mut registry = Self::default();
        for config in configs {
            let name = config.index_allocator().clone();
            if registry.allocators.contains_key(&name) {
                return Err(StatusError::validation(format!(
                    "indexAllocator {:?} is used by more than one status list configuration",
                    name.as_str()
                )));
            }
            let allocator = IndexAllocator::new(config, Arc::clone(&store), retry)?;
            registry.order.push(name.clone());
            registry.allocators.insert(name, Arc::new(allocator));
        }
        Ok(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.allocators.len()
    }

    /// Allocator by exact name.
    pub fn get(&self, name: &AllocatorName) -> Result<&Arc<IndexAllocator>, StatusError> {
        self.allocators
            .get(name)
            .ok_or_else(|| StatusError::NotFound(format!("indexAllocator {:?}", name.as_str())))
    }

    /// Pick the allocator a request refers to.
    ///
    /// Without a name, the single configured allocator is used; when
    /// several exist the caller must choose.
    pub fn resolve(
        &self,
        name: Option<&AllocatorName>,
    ) -> Result<&Arc<IndexAllocator>, StatusError> {
        match name {
            Some(name) => self.get(name),
            None => match self.order.as_slice() {
                [only] => self.get(only),
                [] => Err(StatusError::NotFound(
                    "no status list configuration is provisioned".into(),
                )),
                _ => Err(StatusError::validation(
                    "indexAllocator is required when several status list configurations exist",
                )),
            },
        }
    }

    /// Allocators in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<IndexAllocator>> {
        self.order.iter().filter_map(|name| self.allocators.get(name))
    }
}

#[cfg(test)]
mod tests {
    use vcsl_core::StatusPurpose;

    use super::*;
    use crate::config::{BitstringStatusListConfig, ListConfig};
    use crate::memory::MemoryStatusStore;

    fn config(name: &str) -> StatusListConfig {
        StatusListConfig::Bitstring(BitstringStatusListConfig {
            index_allocator: AllocatorName::new(name).unwrap(),
            base_url: format!("https://status.example/{name}"),
            status_purposes: vec![StatusPurpose::Revocation],
            list_config: ListConfig::new(8, 1, None).unwrap(),
        })
    }

    fn registry(names: &[&str]) -> Result<AllocatorRegistry, StatusError> {
        AllocatorRegistry::new(
            names.iter().map(|n| config(n)).collect(),
            Arc::new(MemoryStatusStore::new()),
            RetryPolicy::default(),
        )
    }

    #[test]
    fn single_allocator_is_the_default() {
        let reg = registry(&["a"]).unwrap();
        assert_eq!(reg.resolve(None).unwrap().name().as_str(), "a");
    }

    #[test]
    fn several_allocators_require_a_name() {
        let reg = registry(&["a", "b"]).unwrap();
        assert!(matches!(reg.resolve(None), Err(StatusError::Validation(_))));
        let b = AllocatorName::new("b").unwrap();
        assert_eq!(reg.resolve(Some(&b)).unwrap().name(), &b);
        let names: Vec<_> = reg.iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn shared_allocator_names_are_rejected() {
        assert!(registry(&["a", "a"]).is_err());
    }

    #[test]
    fn unknown_allocator_is_not_found() {
        let reg = registry(&["a"]).unwrap();
        let missing = AllocatorName::new("zzz").unwrap();
        assert!(matches!(reg.get(&missing), Err(StatusError::NotFound(_))));
    }
}
