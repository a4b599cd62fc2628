//! Authoritative record store abstraction.
//!
//! Bindings never own data; they mirror the subset of a record type that a
//! [`Filter`] selects. The [`RecordStore`] trait is the read side bindings
//! query when their cache is cold. [`InMemoryRecordStore`] is a complete
//! store for tests and single-process deployments; it emits post-commit
//! notifications through a [`ChangeFeed`].

use crate::change_feed::{ChangeFeed, ChangeType, StoreHook};
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::record::{Fields, Record};
use crate::types::RecordId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Read access to the authoritative store.
pub trait RecordStore: Send + Sync {
    /// Returns every record of `record_type` that matches `filter`, ordered
    /// by id.
    fn query(&self, record_type: &str, filter: &Filter) -> CoreResult<Vec<Record>>;

    /// Fetches one record by id.
    fn get(&self, record_type: &str, id: RecordId) -> CoreResult<Option<Record>>;

    /// Fetches several records by id. Ids that do not exist are skipped.
    fn get_many(&self, record_type: &str, ids: &[RecordId]) -> CoreResult<Vec<Record>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(record_type, *id)? {
                found.push(record);
            }
        }
        Ok(found)
    }
}

/// In-memory record store with post-commit hooks.
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<String, BTreeMap<RecordId, Record>>>,
    next_id: AtomicU64,
    available: AtomicBool,
    feed: ChangeFeed,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            feed: ChangeFeed::new(),
        }
    }

    /// Registers a hook notified after every committed save or delete.
    pub fn subscribe(&self, hook: Arc<dyn StoreHook>) {
        self.feed.subscribe(hook);
    }

    /// Returns the change feed.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Simulates the store going offline (`false`) or recovering (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Inserts a new record with a freshly assigned id.
    pub fn create(&self, record_type: &str, fields: Fields) -> CoreResult<Record> {
        self.check_available()?;
        let id = RecordId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = Record::with_fields(id, fields);
        self.tables
            .write()
            .entry(record_type.to_string())
            .or_default()
            .insert(id, record.clone());

        self.feed.emit(record_type, id, ChangeType::Created);
        Ok(record)
    }

    /// Replaces an existing record.
    ///
    /// Saving identical content still commits and notifies hooks.
    pub fn update(&self, record_type: &str, record: Record) -> CoreResult<()> {
        self.check_available()?;
        let id = record.id;
        {
            let mut tables = self.tables.write();
            let slot = tables
                .get_mut(record_type)
                .and_then(|table| table.get_mut(&id))
                .ok_or_else(|| CoreError::RecordNotFound {
                    record_type: record_type.to_string(),
                    id,
                })?;
            *slot = record;
        }

        self.feed.emit(record_type, id, ChangeType::Updated);
        Ok(())
    }

    /// Deletes a record. Returns `false` if it did not exist.
    pub fn delete(&self, record_type: &str, id: RecordId) -> CoreResult<bool> {
        self.check_available()?;
        let removed = self
            .tables
            .write()
            .get_mut(record_type)
            .and_then(|table| table.remove(&id))
            .is_some();

        if removed {
            self.feed.emit(record_type, id, ChangeType::Deleted);
        }
        Ok(removed)
    }

    /// Returns the number of records of a type.
    pub fn count(&self, record_type: &str) -> usize {
        self.tables.read().get(record_type).map_or(0, BTreeMap::len)
    }

    fn check_available(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::store_unavailable("record store is offline"))
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn query(&self, record_type: &str, filter: &Filter) -> CoreResult<Vec<Record>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .get(record_type)
            .map(|table| {
                table
                    .values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get(&self, record_type: &str, id: RecordId) -> CoreResult<Option<Record>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .get(record_type)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    fn get_many(&self, record_type: &str, ids: &[RecordId]) -> CoreResult<Vec<Record>> {
        self.check_available()?;
        let tables = self.tables.read();
        let Some(table) = tables.get(record_type) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| table.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn fields(name: &str, venue: &str) -> Fields {
        Record::new(0)
            .with("name", name)
            .with("venue", venue)
            .fields
    }

    #[test]
    fn create_assigns_ids() {
        let store = InMemoryRecordStore::new();
        let a = store.create("Product", fields("t1", "store")).unwrap();
        let b = store.create("Product", fields("t2", "store")).unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.count("Product"), 2);
        assert_eq!(store.count("Order"), 0);
    }

    #[test]
    fn query_applies_filter() {
        let store = InMemoryRecordStore::new();
        store.create("Product", fields("t1", "store")).unwrap();
        store.create("Product", fields("t2", "store")).unwrap();
        store.create("Product", fields("t3", "online")).unwrap();

        let in_store = store
            .query("Product", &Filter::new().eq("venue", "store"))
            .unwrap();
        assert_eq!(in_store.len(), 2);
        assert!(store.query("Order", &Filter::new()).unwrap().is_empty());
    }

    #[test]
    fn update_and_delete() {
        let store = InMemoryRecordStore::new();
        let mut record = store.create("Product", fields("t1", "store")).unwrap();
        record.set("venue", "online");
        store.update("Product", record.clone()).unwrap();
        assert_eq!(store.get("Product", record.id).unwrap(), Some(record.clone()));

        assert!(store.delete("Product", record.id).unwrap());
        assert!(!store.delete("Product", record.id).unwrap());
        assert!(matches!(
            store.update("Product", record),
            Err(CoreError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn get_many_skips_missing() {
        let store = InMemoryRecordStore::new();
        let a = store.create("Product", fields("t1", "store")).unwrap();
        let found = store
            .get_many("Product", &[a.id, RecordId::new(999)])
            .unwrap();
        assert_eq!(found, vec![a]);
    }

    #[test]
    fn offline_store_fails_reads_and_writes() {
        let store = InMemoryRecordStore::new();
        store.set_available(false);
        assert!(store
            .query("Product", &Filter::new())
            .unwrap_err()
            .is_store_unavailable());
        assert!(store.create("Product", Fields::new()).is_err());

        store.set_available(true);
        assert!(store.create("Product", Fields::new()).is_ok());
    }

    struct Hook(Mutex<Vec<ChangeType>>);

    impl StoreHook for Hook {
        fn record_saved(&self, _: &str, _: RecordId, created: bool) {
            self.0.lock().push(if created {
                ChangeType::Created
            } else {
                ChangeType::Updated
            });
        }

        fn record_deleted(&self, _: &str, _: RecordId) {
            self.0.lock().push(ChangeType::Deleted);
        }
    }

    #[test]
    fn hooks_fire_after_commit() {
        let store = InMemoryRecordStore::new();
        let hook = Arc::new(Hook(Mutex::new(Vec::new())));
        store.subscribe(hook.clone());

        let record = store.create("Product", fields("t1", "store")).unwrap();
        store.update("Product", record.clone()).unwrap();
        store.delete("Product", record.id).unwrap();
        store.delete("Product", record.id).unwrap();

        assert_eq!(
            *hook.0.lock(),
            vec![ChangeType::Created, ChangeType::Updated, ChangeType::Deleted]
        );
        assert_eq!(store.feed().subscriber_count(), 1);
    }
}
