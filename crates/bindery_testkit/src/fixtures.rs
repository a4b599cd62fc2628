//! Test fixtures and harness helpers.
//!
//! The product catalogue used throughout the tests has three records:
//! `t1` and `t2` sold in store, `t3` sold online.

use bindery_core::{
    Binding, BindingChange, BindingDescriptor, BindingListener, CacheStore, ChangeAction,
    ChangeDispatcher, DispatcherConfig, Fields, Filter, InMemoryCacheStore, InMemoryRecordStore,
    ListenerId, Record, RecordId, RecordStore,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Record type of the product fixtures.
pub const PRODUCT: &str = "Product";

/// Field values of a product.
pub fn product(name: &str, venue: &str) -> Fields {
    Record::new(0).with("name", name).with("venue", venue).fields
}

/// Ids of the seeded products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Products {
    /// `t1`, in store.
    pub t1: RecordId,
    /// `t2`, in store.
    pub t2: RecordId,
    /// `t3`, online.
    pub t3: RecordId,
}

/// Creates `t1`, `t2` and `t3` in `store`.
pub fn seed_products(store: &InMemoryRecordStore) -> Products {
    let create = |name: &str, venue: &str| {
        store
            .create(PRODUCT, product(name, venue))
            .expect("Failed to create product fixture")
            .id
    };
    Products {
        t1: create("t1", "store"),
        t2: create("t2", "store"),
        t3: create("t3", "online"),
    }
}

/// Descriptor of the in-store products view.
pub fn in_store() -> BindingDescriptor {
    BindingDescriptor::new(PRODUCT, "store").with_filter(Filter::new().eq("venue", "store"))
}

/// Rewrites one field of a stored record.
pub fn update_field(store: &InMemoryRecordStore, id: RecordId, field: &str, value: impl Into<Value>) {
    let mut record = store
        .get(PRODUCT, id)
        .expect("Failed to read product")
        .expect("Product fixture missing");
    record.set(field, value);
    store
        .update(PRODUCT, record)
        .expect("Failed to update product");
}

/// A listener that records every change it receives.
pub struct RecordingListener {
    id: ListenerId,
    changes: Mutex<Vec<BindingChange>>,
}

impl RecordingListener {
    /// Creates a listener with the given id.
    pub fn new(id: impl Into<ListenerId>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            changes: Mutex::new(Vec::new()),
        })
    }

    /// Creates a listener and attaches it to `binding`.
    pub fn attach(binding: &Binding) -> Arc<Self> {
        let listener = Self::new("recorder");
        binding.add_listener(Arc::clone(&listener) as Arc<dyn BindingListener>);
        listener
    }

    /// Returns every change received so far.
    pub fn changes(&self) -> Vec<BindingChange> {
        self.changes.lock().clone()
    }

    /// Returns the actions received so far.
    pub fn actions(&self) -> Vec<ChangeAction> {
        self.changes.lock().iter().map(|c| c.action).collect()
    }

    /// Returns the number of changes received.
    pub fn len(&self) -> usize {
        self.changes.lock().len()
    }

    /// Returns true if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.changes.lock().is_empty()
    }

    /// Forgets received changes.
    pub fn clear(&self) {
        self.changes.lock().clear();
    }
}

impl BindingListener for RecordingListener {
    fn id(&self) -> ListenerId {
        self.id.clone()
    }

    fn on_change(&self, change: &BindingChange) {
        self.changes.lock().push(change.clone());
    }
}

/// A record store and cache shared by any number of dispatchers.
///
/// Must be created inside a tokio runtime.
pub struct Harness {
    /// The authoritative store, seeded with the product fixtures.
    pub store: Arc<InMemoryRecordStore>,
    /// The shared cache.
    pub cache: Arc<InMemoryCacheStore>,
    /// The first process's dispatcher, subscribed to the store.
    pub dispatcher: Arc<ChangeDispatcher>,
    /// Ids of the seeded products.
    pub products: Products,
    config: DispatcherConfig,
}

impl Harness {
    /// Creates a harness with default dispatcher settings.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Creates a harness whose dispatchers use `config`.
    pub fn with_config(config: DispatcherConfig) -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let products = seed_products(&store);
        let cache = Arc::new(InMemoryCacheStore::new());
        let dispatcher = Self::subscribe(&store, &cache, config);
        Self {
            store,
            cache,
            dispatcher,
            products,
            config,
        }
    }

    /// Starts another dispatcher over the same store and cache, as a
    /// separate process would.
    pub fn process(&self) -> Arc<ChangeDispatcher> {
        Self::subscribe(&self.store, &self.cache, self.config)
    }

    /// Returns the store as the trait object bindings take.
    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store) as Arc<dyn RecordStore>
    }

    /// Returns the cache as the trait object bindings take.
    pub fn cache_store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.cache) as Arc<dyn CacheStore>
    }

    /// Waits past the debounce window so pending saves apply.
    pub async fn settle(&self) {
        settle(self.config.debounce_window).await;
    }

    fn subscribe(
        store: &Arc<InMemoryRecordStore>,
        cache: &Arc<InMemoryCacheStore>,
        config: DispatcherConfig,
    ) -> Arc<ChangeDispatcher> {
        let dispatcher = ChangeDispatcher::new(store.clone(), cache.clone(), config)
            .expect("Harness must be created inside a tokio runtime");
        store.subscribe(dispatcher.clone());
        dispatcher
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps just past `window`.
pub async fn settle(window: Duration) {
    tokio::time::sleep(window + Duration::from_millis(10)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn harness_seeds_products() {
        let harness = Harness::new();
        assert_eq!(harness.store.count(PRODUCT), 3);

        let binding = harness.dispatcher.bind(in_store());
        let ids: Vec<_> = binding.keys().unwrap();
        assert_eq!(ids, vec![harness.products.t1, harness.products.t2]);
    }

    #[tokio::test(start_paused = true)]
    async fn recording_listener_sees_changes() {
        let harness = Harness::new();
        let binding = harness.dispatcher.bind(in_store());
        binding.ensure_loaded().unwrap();
        let recorder = RecordingListener::attach(&binding);

        update_field(&harness.store, harness.products.t3, "venue", "store");
        harness.settle().await;

        assert_eq!(recorder.actions(), vec![ChangeAction::Create]);
        recorder.clear();
        assert!(recorder.is_empty());
    }
}
