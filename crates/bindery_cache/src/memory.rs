//! In-memory cache store.

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Writes between full sweeps of expired entries.
const SWEEP_EVERY: u64 = 64;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// An in-memory cache store.
///
/// Entries live in an ordered map so prefix scans are cheap and
/// deterministic. Expired entries are skipped on read paths, removed when
/// their key is written, and swept from the whole map every few writes.
///
/// The store can be switched offline with [`set_available`] to exercise
/// the callers' degradation paths; every operation then fails with
/// `CacheError::Unavailable`.
///
/// [`set_available`]: InMemoryCacheStore::set_available
///
/// # Example
///
/// ```rust
/// use bindery_cache::{CacheStore, InMemoryCacheStore};
///
/// let store = InMemoryCacheStore::new();
/// store.set("version", b"1".to_vec(), None).unwrap();
/// assert_eq!(store.incr("version", 1).unwrap(), 2);
/// ```
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: RwLock<BTreeMap<String, Entry>>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryCacheStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    /// Marks the store as reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if the store is currently reachable.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    /// Returns true if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn flush_all(&self) {
        self.entries.write().clear();
    }

    /// Removes every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        Self::sweep(&mut self.entries.write(), Instant::now())
    }

    fn check(&self) -> CacheResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(CacheError::Unavailable("in-memory cache marked offline".into()))
        }
    }

    fn purge_expired(entries: &mut BTreeMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
    }

    fn sweep(entries: &mut BTreeMap<String, Entry>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Counts a write, sweeping expired entries every `SWEEP_EVERY` writes.
    fn note_write(&self, entries: &mut BTreeMap<String, Entry>) {
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            Self::sweep(entries, Instant::now());
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check()?;
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), Entry::new(value, ttl));
        self.note_write(&mut entries);
        Ok(())
    }

    fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool> {
        self.check()?;
        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, key, Instant::now());
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(value, ttl));
        self.note_write(&mut entries);
        Ok(true)
    }

    fn get_many(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        self.check()?;
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(key)
                    .filter(|e| e.is_live(now))
                    .map(|e| (key.clone(), e.value.clone()))
            })
            .collect())
    }

    fn set_many(&self, items: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        let mut entries = self.entries.write();
        for (key, value) in items {
            entries.insert(key, Entry::new(value, ttl));
        }
        self.note_write(&mut entries);
        Ok(())
    }

    fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.check()?;
        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, key, Instant::now());

        let entry = entries.get_mut(key).ok_or_else(|| CacheError::NotFound {
            key: key.to_string(),
        })?;
        let current: i64 = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CacheError::NotACounter {
                key: key.to_string(),
            })?;

        let next = current.saturating_add(delta);
        entry.value = next.to_string().into_bytes();
        Ok(next)
    }

    fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.check()?;
        let mut entries = self.entries.write();
        Self::purge_expired(&mut entries, key, Instant::now());
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .remove(key)
            .is_some_and(|e| e.is_live(now)))
    }

    fn scan_prefix(&self, prefix: &str) -> CacheResult<Vec<(String, Vec<u8>)>> {
        self.check()?;
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect())
    }

    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.check()?;
        let mut entries = self.entries.write();
        let keys: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryCacheStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_set_and_get() {
        let store = InMemoryCacheStore::new();
        store.set("a", b"one".to_vec(), None).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"one".to_vec()));

        store.set("a", b"two".to_vec(), None).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_zero_ttl_expires_immediately() {
        let store = InMemoryCacheStore::new();
        store.set("a", b"one".to_vec(), Some(Duration::ZERO)).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn memory_add_only_when_absent() {
        let store = InMemoryCacheStore::new();
        assert!(store.add("lock", b"1".to_vec(), None).unwrap());
        assert!(!store.add("lock", b"2".to_vec(), None).unwrap());
        assert_eq!(store.get("lock").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn memory_add_replaces_expired() {
        let store = InMemoryCacheStore::new();
        store.set("lock", b"old".to_vec(), Some(Duration::ZERO)).unwrap();
        assert!(store.add("lock", b"new".to_vec(), None).unwrap());
    }

    #[test]
    fn memory_incr_missing_key_fails() {
        let store = InMemoryCacheStore::new();
        let result = store.incr("version", 1);
        assert!(matches!(result, Err(CacheError::NotFound { .. })));
    }

    #[test]
    fn memory_incr_expired_key_fails() {
        let store = InMemoryCacheStore::new();
        store.set("version", b"7".to_vec(), Some(Duration::ZERO)).unwrap();
        assert!(store.incr("version", 1).unwrap_err().is_not_found());
    }

    #[test]
    fn memory_incr_non_counter_fails() {
        let store = InMemoryCacheStore::new();
        store.set("blob", vec![0xa1, 0x00], None).unwrap();
        assert!(matches!(
            store.incr("blob", 1),
            Err(CacheError::NotACounter { .. })
        ));
    }

    #[test]
    fn memory_incr_counts() {
        let store = InMemoryCacheStore::new();
        store.set("version", b"1".to_vec(), None).unwrap();
        assert_eq!(store.incr("version", 1).unwrap(), 2);
        assert_eq!(store.incr("version", 3).unwrap(), 5);
        assert_eq!(store.get("version").unwrap(), Some(b"5".to_vec()));
    }

    #[test]
    fn memory_get_many_omits_missing() {
        let store = InMemoryCacheStore::new();
        store
            .set_many(
                vec![("a".into(), b"1".to_vec()), ("b".into(), b"2".to_vec())],
                None,
            )
            .unwrap();

        let found = store
            .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], b"2".to_vec());
    }

    #[test]
    fn memory_expire() {
        let store = InMemoryCacheStore::new();
        store.set("a", b"1".to_vec(), None).unwrap();
        assert!(store.expire("a", Duration::ZERO).unwrap());
        assert_eq!(store.get("a").unwrap(), None);
        assert!(!store.expire("missing", Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn memory_sweep_removes_expired_entries() {
        let store = InMemoryCacheStore::new();
        store.set("retired", b"old".to_vec(), Some(Duration::ZERO)).unwrap();
        store.set("live", b"new".to_vec(), None).unwrap();
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.get("live").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn memory_writes_sweep_untouched_expired_entries() {
        let store = InMemoryCacheStore::new();
        store.set("retired", b"old".to_vec(), Some(Duration::ZERO)).unwrap();
        for n in 0..SWEEP_EVERY {
            store.set("counter", n.to_string().into_bytes(), None).unwrap();
        }
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn memory_delete() {
        let store = InMemoryCacheStore::new();
        store.set("a", b"1".to_vec(), None).unwrap();
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
    }

    #[test]
    fn memory_scan_prefix_is_ordered_and_bounded() {
        let store = InMemoryCacheStore::new();
        store.set("registry:Product:b", b"2".to_vec(), None).unwrap();
        store.set("registry:Product:a", b"1".to_vec(), None).unwrap();
        store.set("registry:Order:a", b"x".to_vec(), None).unwrap();
        store.set("registry:Productz", b"y".to_vec(), None).unwrap();

        let found = store.scan_prefix("registry:Product:").unwrap();
        let keys: Vec<_> = found.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["registry:Product:a", "registry:Product:b"]);
    }

    #[test]
    fn memory_delete_prefix() {
        let store = InMemoryCacheStore::new();
        store.set("binding:P:all:objects", b"1".to_vec(), None).unwrap();
        store.set("binding:P:all:version", b"1".to_vec(), None).unwrap();
        store.set("binding:P:allx:version", b"1".to_vec(), None).unwrap();

        assert_eq!(store.delete_prefix("binding:P:all:").unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_offline_fails_everything() {
        let store = InMemoryCacheStore::new();
        store.set("a", b"1".to_vec(), None).unwrap();
        store.set_available(false);

        assert!(store.get("a").unwrap_err().is_unavailable());
        assert!(store.set("a", b"2".to_vec(), None).unwrap_err().is_unavailable());
        assert!(store.incr("a", 1).unwrap_err().is_unavailable());

        store.set_available(true);
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
    }
}
