//! Cross-process directory of live bindings.
//!
//! Entries live in the shared cache under `registry:{type}:{name}`, so a
//! dispatcher in any process can find every binding declared over a record
//! type and materialize it locally. Entries expire unless renewed.

use crate::descriptor::{binding_key, key_part, BindingDescriptor};
use crate::error::CoreResult;
use bindery_cache::{CacheStore, KeyedCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Namespace of registry entries.
pub const REGISTRY_PREFIX: &str = "registry";

/// Shared-cache directory of binding descriptors.
#[derive(Debug, Clone)]
pub struct BindingRegistry {
    entries: KeyedCache,
}

impl BindingRegistry {
    /// Creates a registry whose entries live for `ttl` after each renewal.
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            entries: KeyedCache::new(REGISTRY_PREFIX, cache).with_ttl(Some(ttl)),
        }
    }

    /// Returns the entry lifetime.
    pub fn ttl(&self) -> Option<Duration> {
        self.entries.ttl()
    }

    /// Adds or renews a binding. Registering twice only refreshes the entry.
    pub fn register(&self, descriptor: &BindingDescriptor) -> CoreResult<()> {
        self.entries.set(&descriptor.key(), descriptor)?;
        debug!(binding = %descriptor.key(), "binding registered");
        Ok(())
    }

    /// Removes a binding. Returns `false` if it was not registered.
    pub fn deregister(&self, record_type: &str, name: &str) -> CoreResult<bool> {
        Ok(self.entries.delete(&binding_key(record_type, name))?)
    }

    /// Returns one registered binding.
    pub fn get(&self, record_type: &str, name: &str) -> CoreResult<Option<BindingDescriptor>> {
        Ok(self.entries.get(&binding_key(record_type, name))?)
    }

    /// Returns every binding registered over `record_type`, ordered by name.
    pub fn lookup(&self, record_type: &str) -> CoreResult<Vec<BindingDescriptor>> {
        Ok(self
            .entries
            .scan::<BindingDescriptor>(&format!("{}:", key_part(record_type)))?
            .into_iter()
            .map(|(_, descriptor)| descriptor)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use bindery_cache::InMemoryCacheStore;

    fn registry() -> (Arc<InMemoryCacheStore>, BindingRegistry) {
        let cache = Arc::new(InMemoryCacheStore::new());
        let registry = BindingRegistry::new(cache.clone(), Duration::from_secs(3600));
        (cache, registry)
    }

    #[test]
    fn register_and_lookup() {
        let (_, registry) = registry();
        let store = BindingDescriptor::new("Product", "store")
            .with_filter(Filter::new().eq("venue", "store"));
        registry.register(&store).unwrap();
        registry.register(&BindingDescriptor::new("Product", "all")).unwrap();
        registry.register(&BindingDescriptor::new("Order", "all")).unwrap();

        let found = registry.lookup("Product").unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["all", "store"]);
        assert_eq!(registry.get("Product", "store").unwrap(), Some(store));
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let (_, registry) = registry();
        let descriptor = BindingDescriptor::new("Product", "all");
        registry.register(&descriptor).unwrap();
        registry.register(&descriptor).unwrap();
        assert_eq!(registry.lookup("Product").unwrap().len(), 1);
    }

    #[test]
    fn lookup_does_not_match_type_prefixes() {
        let (_, registry) = registry();
        registry.register(&BindingDescriptor::new("Product", "all")).unwrap();
        registry
            .register(&BindingDescriptor::new("ProductLine", "all"))
            .unwrap();
        assert_eq!(registry.lookup("Product").unwrap().len(), 1);
    }

    #[test]
    fn separator_in_record_type_stays_in_its_own_namespace() {
        let (_, registry) = registry();
        registry.register(&BindingDescriptor::new("app", "all")).unwrap();
        let nested = BindingDescriptor::new("app:Product", "all");
        registry.register(&nested).unwrap();

        let found = registry.lookup("app").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record_type, "app");
        assert_eq!(registry.lookup("app:Product").unwrap(), vec![nested]);
    }

    #[test]
    fn deregister() {
        let (_, registry) = registry();
        registry.register(&BindingDescriptor::new("Product", "all")).unwrap();
        assert!(registry.deregister("Product", "all").unwrap());
        assert!(!registry.deregister("Product", "all").unwrap());
        assert!(registry.lookup("Product").unwrap().is_empty());
    }

    #[test]
    fn entries_expire() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let registry = BindingRegistry::new(cache, Duration::ZERO);
        registry.register(&BindingDescriptor::new("Product", "all")).unwrap();
        assert!(registry.lookup("Product").unwrap().is_empty());
    }

    #[test]
    fn outage_is_reported() {
        let (cache, registry) = registry();
        cache.set_available(false);
        assert!(registry.lookup("Product").is_err());
    }
}
