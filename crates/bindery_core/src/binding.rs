//! Cache-backed filtered views.
//!
//! A [`Binding`] mirrors the records of one type that match a filter. Its
//! state lives in the shared cache, so every process holding the same cache
//! sees the same view:
//!
//! | Key                                   | Contents                              |
//! |---------------------------------------|---------------------------------------|
//! | `binding:{type}:{name}:objects`       | id-set of members                     |
//! | `binding:{type}:{name}:version`       | change counter                        |
//! | `binding:{type}:{name}:last-modified` | time of the last version bump         |
//! | `objects:{type}:{id}`                 | record value, shared within the type  |
//!
//! The record store stays authoritative. A missing id-set is rebuilt from a
//! store query, missing values are re-fetched by id, and cache failures are
//! logged and answered from the store. A binding that failed to persist a
//! change drops its cached id-set once the cache is reachable again, so the
//! next read rebuilds the view under a new version.

use crate::descriptor::{key_part, BindingDescriptor};
use crate::error::CoreResult;
use crate::filter::Filter;
use crate::listener::{BindingChange, BindingListener, ChangeAction, ListenerId};
use crate::record::Record;
use crate::store::RecordStore;
use crate::types::{RecordId, Timestamp};
use bindery_cache::{CacheError, CacheStore, KeyedCache};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const OBJECTS: &str = "objects";
const VERSION: &str = "version";
const LAST_MODIFIED: &str = "last-modified";

/// Identity and change state of a binding at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingMetadata {
    /// Record type of the binding.
    pub record_type: String,
    /// Binding name.
    pub name: String,
    /// Version counter; 0 before the view was first built.
    pub version: u64,
    /// Time of the last version bump.
    pub last_modified: Option<Timestamp>,
}

/// Id-set as loaded, and whether loading had to rebuild it.
struct Members {
    ids: BTreeSet<RecordId>,
    rebuilt: bool,
}

/// A named, filtered, cache-backed view over one record type.
pub struct Binding {
    descriptor: BindingDescriptor,
    store: Arc<dyn RecordStore>,
    meta: KeyedCache,
    values: KeyedCache,
    listeners: RwLock<Vec<Arc<dyn BindingListener>>>,
    /// Membership as this process last saw or wrote it.
    known: RwLock<Option<BTreeSet<RecordId>>>,
    /// Set when a write was lost; the cached id-set can no longer be trusted.
    stale: AtomicBool,
}

impl Binding {
    /// Creates a binding over `store`, keeping its state in `cache`.
    ///
    /// Construction touches the cache only to seed the last-modified time;
    /// the view itself is built on first read.
    pub fn new(
        descriptor: BindingDescriptor,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let config = descriptor.config;
        let meta = KeyedCache::new(format!("binding:{}", descriptor.key()), Arc::clone(&cache))
            .with_ttl(config.meta_ttl);
        let values = KeyedCache::new(format!("objects:{}", key_part(&descriptor.record_type)), cache)
            .with_ttl(config.value_ttl);

        let binding = Self {
            descriptor,
            store,
            meta,
            values,
            listeners: RwLock::new(Vec::new()),
            known: RwLock::new(None),
            stale: AtomicBool::new(false),
        };
        if let Err(err) = binding
            .meta
            .add(LAST_MODIFIED, &Timestamp::now(), binding.meta.ttl())
        {
            binding.degraded("seed last-modified", &err);
        }
        binding
    }

    /// Returns the descriptor.
    pub fn descriptor(&self) -> &BindingDescriptor {
        &self.descriptor
    }

    /// Returns the record type.
    pub fn record_type(&self) -> &str {
        &self.descriptor.record_type
    }

    /// Returns the binding name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Returns `"{record_type}:{name}"`.
    pub fn key(&self) -> String {
        self.descriptor.key()
    }

    /// Returns the membership filter.
    pub fn filter(&self) -> &Filter {
        &self.descriptor.filter
    }

    /// Returns true if the record belongs in this view.
    pub fn matches(&self, record: &Record) -> bool {
        self.descriptor.filter.matches(record)
    }

    /// Returns the current version, or 0 if the view was never built.
    pub fn version(&self) -> u64 {
        match self.meta.get_counter(VERSION) {
            Ok(version) => version.and_then(|v| u64::try_from(v).ok()).unwrap_or(0),
            Err(err) => {
                self.degraded("read version", &err);
                0
            }
        }
    }

    /// Returns the time of the last version bump.
    pub fn last_modified(&self) -> Option<Timestamp> {
        self.meta.get(LAST_MODIFIED).unwrap_or_else(|err| {
            self.degraded("read last-modified", &err);
            None
        })
    }

    /// Returns the current identity and change state.
    pub fn metadata(&self) -> BindingMetadata {
        BindingMetadata {
            record_type: self.descriptor.record_type.clone(),
            name: self.descriptor.name.clone(),
            version: self.version(),
            last_modified: self.last_modified(),
        }
    }

    /// Returns every member of the view keyed by id.
    ///
    /// Builds the view from the store if its id-set is not cached. Values
    /// missing from the cache are re-fetched by id; members the store no
    /// longer has, or that no longer match, are pruned.
    pub fn all(&self) -> CoreResult<BTreeMap<RecordId, Record>> {
        match self.cached_ids() {
            Some(ids) => {
                let ids: Vec<RecordId> = ids.into_iter().collect();
                Ok(self
                    .records(&ids)?
                    .into_iter()
                    .map(|record| (record.id, record))
                    .collect())
            }
            None => self.rebuild(),
        }
    }

    /// Returns the member ids in ascending order.
    pub fn keys(&self) -> CoreResult<Vec<RecordId>> {
        Ok(self.load_members()?.ids.into_iter().collect())
    }

    /// Returns the values of the given member ids, in the given order.
    ///
    /// Ids whose records are gone from the store are pruned from the view
    /// and omitted from the result.
    pub fn records(&self, ids: &[RecordId]) -> CoreResult<Vec<Record>> {
        let names: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let mut found: HashMap<RecordId, Record> = match self.values.get_many::<Record>(&names) {
            Ok(hits) => hits.into_values().map(|r| (r.id, r)).collect(),
            Err(err) => {
                self.degraded("read values", &err);
                HashMap::new()
            }
        };

        let missing: Vec<RecordId> = ids
            .iter()
            .copied()
            .filter(|id| !found.contains_key(id))
            .collect();
        if !missing.is_empty() {
            debug!(
                binding = %self.key(),
                missing = missing.len(),
                "re-fetching values missing from cache"
            );
            let (fresh, stale): (Vec<Record>, Vec<Record>) = self
                .store
                .get_many(self.record_type(), &missing)?
                .into_iter()
                .partition(|record| self.matches(record));
            self.write_values(&fresh);
            found.extend(fresh.into_iter().map(|r| (r.id, r)));

            let stale: HashMap<RecordId, Record> = stale.into_iter().map(|r| (r.id, r)).collect();
            for id in missing.iter().filter(|id| !found.contains_key(id)) {
                self.remove_member(*id, stale.get(id))?;
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// Builds the view if its id-set is not cached.
    pub fn ensure_loaded(&self) -> CoreResult<()> {
        self.load_members().map(|_| ())
    }

    /// Drops the cached id-set, version and last-modified time.
    ///
    /// Shared record values are left alone. The next read rebuilds the view
    /// and restarts the version at 1.
    pub fn clear(&self) -> CoreResult<()> {
        let removed = self.meta.clear()?;
        debug!(binding = %self.key(), removed, "binding cache cleared");
        Ok(())
    }

    /// Applies a committed save of `record`.
    ///
    /// Returns the action announced to listeners, or `None` if the record
    /// neither is nor was a member.
    ///
    /// A record is announced as created when the save created it or moved
    /// it into the view. When the view had to be rebuilt first, entry is
    /// judged against the membership this process last saw. If it never saw
    /// the view, the save counts as an update.
    pub fn on_record_saved(
        &self,
        record: &Record,
        created: bool,
    ) -> CoreResult<Option<ChangeAction>> {
        if !self.matches(record) {
            return self.remove_member(record.id, Some(record));
        }

        let was_known = self
            .known
            .read()
            .as_ref()
            .map(|ids| ids.contains(&record.id));
        let mut members = self.load_members()?;
        let inserted = members.ids.insert(record.id);
        let entered = if members.rebuilt {
            was_known == Some(false)
        } else {
            inserted
        };

        self.write_values([record]);
        if inserted {
            self.write_ids(&members.ids);
        }
        // a rebuild already bumped for this state
        if !members.rebuilt {
            self.bump();
        }

        let action = if created || entered {
            ChangeAction::Create
        } else {
            ChangeAction::Update
        };
        self.emit(action, record);
        Ok(Some(action))
    }

    /// Applies a committed delete of record `id`.
    pub fn on_record_deleted(&self, id: RecordId) -> CoreResult<Option<ChangeAction>> {
        self.remove_member(id, None)
    }

    /// Attaches a listener. Returns `false` if one with the same id exists.
    pub fn add_listener(&self, listener: Arc<dyn BindingListener>) -> bool {
        let id = listener.id();
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|existing| existing.id() == id) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Detaches a listener. Returns `false` if it was not attached.
    pub fn remove_listener(&self, id: &ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|listener| listener.id() != *id);
        listeners.len() != before
    }

    /// Returns the number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn remove_member(
        &self,
        id: RecordId,
        known: Option<&Record>,
    ) -> CoreResult<Option<ChangeAction>> {
        let mut members = self.load_members()?;
        if !members.ids.remove(&id) {
            return Ok(None);
        }

        let record = match known {
            Some(record) => record.clone(),
            None => self.cached_value(id).unwrap_or_else(|| Record::new(id)),
        };
        self.write_ids(&members.ids);
        self.retire_value(id);
        self.bump();
        self.emit(ChangeAction::Delete, &record);
        Ok(Some(ChangeAction::Delete))
    }

    fn load_members(&self) -> CoreResult<Members> {
        if let Some(ids) = self.cached_ids() {
            return Ok(Members { ids, rebuilt: false });
        }
        Ok(Members {
            ids: self.rebuild()?.into_keys().collect(),
            rebuilt: true,
        })
    }

    fn rebuild(&self) -> CoreResult<BTreeMap<RecordId, Record>> {
        let view: BTreeMap<RecordId, Record> = self
            .store
            .query(self.record_type(), self.filter())?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        // values first, so a reader that sees the id-set finds them
        self.write_values(view.values());
        self.write_ids(&view.keys().copied().collect());
        let version = self.bump();
        debug!(binding = %self.key(), members = view.len(), version, "view rebuilt from store");
        Ok(view)
    }

    fn bump(&self) -> u64 {
        if let Err(err) = self.meta.set(LAST_MODIFIED, &Timestamp::now()) {
            self.lost("write last-modified", &err);
        }
        match self.meta.incr(VERSION) {
            Ok(version) => u64::try_from(version).unwrap_or(0),
            Err(CacheError::NotFound { .. } | CacheError::NotACounter { .. }) => {
                warn!(binding = %self.key(), "version counter lost, restarting at 1");
                if let Err(err) = self.meta.set_counter(VERSION, 1) {
                    self.lost("reset version", &err);
                    return 0;
                }
                1
            }
            Err(err) => {
                self.lost("bump version", &err);
                0
            }
        }
    }

    fn emit(&self, action: ChangeAction, record: &Record) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }

        let change = BindingChange {
            action,
            record: record.clone(),
            binding: self.metadata(),
        };
        trace!(
            binding = %self.key(),
            %action,
            id = %record.id,
            listeners = listeners.len(),
            "notifying listeners"
        );
        for listener in listeners {
            listener.on_change(&change);
        }
    }

    fn cached_ids(&self) -> Option<BTreeSet<RecordId>> {
        let ids: Option<BTreeSet<RecordId>> = match self.meta.get(OBJECTS) {
            Ok(ids) => ids,
            Err(err) => {
                self.degraded("read id-set", &err);
                return None;
            }
        };

        if self.stale.swap(false, Ordering::AcqRel) {
            match self.meta.delete(OBJECTS) {
                Ok(_) => debug!(binding = %self.key(), "dropped id-set that missed writes"),
                Err(err) => self.lost("drop stale id-set", &err),
            }
            return None;
        }

        if let Some(ids) = &ids {
            *self.known.write() = Some(ids.clone());
        }
        ids
    }

    fn cached_value(&self, id: RecordId) -> Option<Record> {
        self.values.get(&id.to_string()).unwrap_or_else(|err| {
            self.degraded("read value", &err);
            None
        })
    }

    fn write_ids(&self, ids: &BTreeSet<RecordId>) {
        *self.known.write() = Some(ids.clone());
        if let Err(err) = self.meta.set(OBJECTS, ids) {
            self.lost("write id-set", &err);
        }
    }

    fn write_values<'a>(&self, records: impl IntoIterator<Item = &'a Record>) {
        let entries = records.into_iter().map(|r| (r.id.to_string(), r));
        if let Err(err) = self.values.set_many(entries) {
            self.lost("write values", &err);
        }
    }

    fn retire_value(&self, id: RecordId) {
        let grace = self.descriptor.config.value_grace;
        if let Err(err) = self.values.expire(&id.to_string(), grace) {
            self.degraded("expire value", &err);
        }
    }

    /// Logs a failed write and marks the cached view for rebuild.
    fn lost(&self, operation: &str, err: &CacheError) {
        self.stale.store(true, Ordering::Release);
        self.degraded(operation, err);
    }

    fn degraded(&self, operation: &str, err: &CacheError) {
        warn!(
            binding = %self.key(),
            operation,
            error = %err,
            "cache operation failed; continuing from the record store"
        );
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("descriptor", &self.descriptor)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
