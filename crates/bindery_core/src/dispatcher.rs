//! Routing of store notifications to bindings.
//!
//! The [`ChangeDispatcher`] is the [`StoreHook`] a process installs on its
//! record store. For every committed change it finds the bindings over the
//! record type, both its own and those other processes registered, and
//! applies the change to each of them.
//!
//! Saves are debounced per record: each save stores a fresh ticket in the
//! shared cache and arms a timer. When the timer fires, only the holder of
//! the latest ticket reacts, so a burst of saves from any number of
//! processes produces one reaction after the burst goes quiet. Deletes are
//! applied immediately.

use crate::binding::Binding;
use crate::change_feed::StoreHook;
use crate::config::DispatcherConfig;
use crate::descriptor::{binding_key, key_part, BindingDescriptor};
use crate::error::{CoreError, CoreResult};
use crate::listener::ListenerFactory;
use crate::registry::BindingRegistry;
use crate::store::RecordStore;
use crate::types::RecordId;
use bindery_cache::{CacheStore, KeyedCache};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// Namespace of pending debounce tickets.
pub const DEBOUNCE_PREFIX: &str = "debounce";

/// The latest pending save of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DebounceTicket {
    token: Uuid,
    /// True if any save in the burst created the record.
    created: bool,
}

/// Applies store changes to every binding over the changed record type.
pub struct ChangeDispatcher {
    config: DispatcherConfig,
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheStore>,
    registry: BindingRegistry,
    tickets: KeyedCache,
    /// Bindings declared through this dispatcher.
    owned: RwLock<HashMap<String, Arc<Binding>>>,
    /// Local materializations of bindings found in the registry.
    discovered: RwLock<HashMap<String, Arc<Binding>>>,
    factory: RwLock<Option<Arc<dyn ListenerFactory>>>,
    runtime: Handle,
    this: Weak<ChangeDispatcher>,
}

impl ChangeDispatcher {
    /// Creates a dispatcher on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when called outside a runtime.
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        config: DispatcherConfig,
    ) -> CoreResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|e| CoreError::InvalidOperation {
            message: format!("change dispatcher needs a tokio runtime: {e}"),
        })?;
        Ok(Self::with_runtime(store, cache, config, runtime))
    }

    /// Creates a dispatcher whose debounce timers run on `runtime`.
    pub fn with_runtime(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        config: DispatcherConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry: BindingRegistry::new(Arc::clone(&cache), config.registry_ttl),
            tickets: KeyedCache::new(DEBOUNCE_PREFIX, Arc::clone(&cache))
                .with_ttl(Some(config.debounce_window * 2)),
            config,
            store,
            cache,
            owned: RwLock::new(HashMap::new()),
            discovered: RwLock::new(HashMap::new()),
            factory: RwLock::new(None),
            runtime,
            this: this.clone(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Returns the registry.
    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }

    /// Returns the record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Installs the factory that equips bindings with listeners.
    ///
    /// Applies to bindings already known to this dispatcher and to every
    /// binding materialized afterwards.
    pub fn set_listener_factory(&self, factory: Arc<dyn ListenerFactory>) {
        *self.factory.write() = Some(Arc::clone(&factory));

        let known: Vec<Arc<Binding>> = self
            .owned
            .read()
            .values()
            .chain(self.discovered.read().values())
            .cloned()
            .collect();
        for binding in known {
            if let Some(listener) = factory.listener_for(binding.descriptor()) {
                binding.add_listener(listener);
            }
        }
    }

    /// Declares a binding and registers it for other processes.
    ///
    /// Binding the same key again renews its registry entry and returns the
    /// existing instance. A registry failure is logged; the binding still
    /// works within this process.
    pub fn bind(&self, descriptor: BindingDescriptor) -> Arc<Binding> {
        if let Err(err) = self.registry.register(&descriptor) {
            warn!(
                binding = %descriptor.key(),
                error = %err,
                "binding not registered; other processes will not update it"
            );
        }

        let key = descriptor.key();
        if let Some(existing) = self.owned.read().get(&key) {
            return Arc::clone(existing);
        }

        let adopted = self
            .discovered
            .write()
            .remove(&key)
            .filter(|found| *found.descriptor() == descriptor);
        let binding = adopted.unwrap_or_else(|| self.materialize(descriptor));
        Arc::clone(self.owned.write().entry(key).or_insert(binding))
    }

    /// Withdraws a binding from this process and from the registry.
    pub fn unbind(&self, record_type: &str, name: &str) -> Option<Arc<Binding>> {
        if let Err(err) = self.registry.deregister(record_type, name) {
            warn!(record_type, name, error = %err, "binding not deregistered");
        }
        let key = binding_key(record_type, name);
        self.discovered.write().remove(&key);
        self.owned.write().remove(&key)
    }

    /// Returns a binding declared through this dispatcher.
    pub fn binding(&self, record_type: &str, name: &str) -> Option<Arc<Binding>> {
        self.owned
            .read()
            .get(&binding_key(record_type, name))
            .cloned()
    }

    /// Returns every binding over `record_type`, ordered by name.
    ///
    /// The union of this dispatcher's own bindings and the registry's
    /// entries. When the registry cannot be read, only the own bindings are
    /// returned.
    pub fn bindings_for(&self, record_type: &str) -> Vec<Arc<Binding>> {
        let mut found: BTreeMap<String, Arc<Binding>> = self
            .owned
            .read()
            .iter()
            .filter(|(_, binding)| binding.record_type() == record_type)
            .map(|(key, binding)| (key.clone(), Arc::clone(binding)))
            .collect();

        match self.registry.lookup(record_type) {
            Ok(descriptors) => {
                let live: HashSet<String> = descriptors.iter().map(BindingDescriptor::key).collect();
                let mut discovered = self.discovered.write();
                discovered.retain(|key, binding| {
                    binding.record_type() != record_type || live.contains(key)
                });

                for descriptor in descriptors {
                    let key = descriptor.key();
                    if found.contains_key(&key) {
                        continue;
                    }
                    let binding = match discovered.get(&key) {
                        Some(existing) if *existing.descriptor() == descriptor => Arc::clone(existing),
                        _ => {
                            debug!(binding = %key, "materializing registered binding");
                            let binding = self.materialize(descriptor);
                            discovered.insert(key.clone(), Arc::clone(&binding));
                            binding
                        }
                    };
                    found.insert(key, binding);
                }
            }
            Err(err) => warn!(
                record_type,
                error = %err,
                "binding registry unavailable; dispatching to own bindings only"
            ),
        }

        found.into_values().collect()
    }

    /// Applies a save to every binding now, without debouncing.
    ///
    /// The record is re-read from the store, so the bindings see its latest
    /// committed state. Returns the number of bindings that changed.
    pub fn dispatch_saved(
        &self,
        record_type: &str,
        id: RecordId,
        created: bool,
    ) -> CoreResult<usize> {
        let Some(record) = self.store.get(record_type, id)? else {
            debug!(record_type, %id, "record gone before its save was applied");
            return Ok(0);
        };

        let mut changed = 0;
        for binding in self.bindings_for(record_type) {
            match binding.on_record_saved(&record, created) {
                Ok(Some(_)) => changed += 1,
                Ok(None) => {}
                Err(err) => error!(binding = %binding.key(), %id, error = %err, "save not applied"),
            }
        }
        Ok(changed)
    }

    /// Applies a delete to every binding. Returns the number that changed.
    pub fn dispatch_deleted(&self, record_type: &str, id: RecordId) -> usize {
        let mut changed = 0;
        for binding in self.bindings_for(record_type) {
            match binding.on_record_deleted(id) {
                Ok(Some(_)) => changed += 1,
                Ok(None) => {}
                Err(err) => error!(binding = %binding.key(), %id, error = %err, "delete not applied"),
            }
        }
        changed
    }

    fn materialize(&self, descriptor: BindingDescriptor) -> Arc<Binding> {
        let binding = Arc::new(Binding::new(
            descriptor,
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
        ));
        let factory = self.factory.read().clone();
        if let Some(listener) = factory.and_then(|f| f.listener_for(binding.descriptor())) {
            binding.add_listener(listener);
        }
        binding
    }

    fn schedule_save(&self, record_type: &str, id: RecordId, created: bool) {
        let name = format!("{}:{id}", key_part(record_type));
        let previous: Option<DebounceTicket> = self.tickets.get(&name).unwrap_or_else(|err| {
            warn!(key = %name, error = %err, "debounce ticket unreadable");
            None
        });
        let ticket = DebounceTicket {
            token: Uuid::new_v4(),
            created: created || previous.is_some_and(|p| p.created),
        };
        if let Err(err) = self.tickets.set(&name, &ticket) {
            warn!(key = %name, error = %err, "debounce ticket not stored; saves will not coalesce");
        }

        let Some(this) = self.this.upgrade() else {
            return;
        };
        let record_type = record_type.to_string();
        let window = self.config.debounce_window;
        self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            if this.claim(&name, &ticket) {
                if let Err(err) = this.dispatch_saved(&record_type, id, ticket.created) {
                    error!(key = %name, error = %err, "debounced save not applied");
                }
            }
        });
    }

    /// Returns true if `ticket` is still the latest one, consuming it.
    ///
    /// A cache that cannot be read counts as a win, so saves still apply
    /// (possibly more than once) during an outage.
    fn claim(&self, name: &str, ticket: &DebounceTicket) -> bool {
        match self.tickets.get::<DebounceTicket>(name) {
            Ok(Some(current)) if current.token != ticket.token => {
                trace!(key = name, "save superseded");
                false
            }
            Ok(Some(_)) => {
                if let Err(err) = self.tickets.delete(name) {
                    warn!(key = name, error = %err, "debounce ticket not released");
                }
                true
            }
            Ok(None) => {
                trace!(key = name, "save already applied");
                false
            }
            Err(err) => {
                warn!(key = name, error = %err, "debounce ticket unreadable; applying save");
                true
            }
        }
    }
}

impl StoreHook for ChangeDispatcher {
    fn record_saved(&self, record_type: &str, id: RecordId, created: bool) {
        self.schedule_save(record_type, id, created);
    }

    fn record_deleted(&self, record_type: &str, id: RecordId) {
        let changed = self.dispatch_deleted(record_type, id);
        trace!(record_type, %id, changed, "delete dispatched");
    }
}

impl fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("config", &self.config)
            .field("owned", &self.owned.read().len())
            .field("discovered", &self.discovered.read().len())
            .finish_non_exhaustive()
    }
}
