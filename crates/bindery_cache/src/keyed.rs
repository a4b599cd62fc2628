//! Namespaced, typed view over a [`CacheStore`].

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A cache namespace.
///
/// Every name passed to a `KeyedCache` is expanded to `"{prefix}:{name}"`
/// before it reaches the backing store, so bindings, their metadata and the
/// shared value cache never collide. Values are encoded as CBOR; counters
/// are stored as decimal text so the backend can increment them.
///
/// Cloning a `KeyedCache` is cheap and shares the backing store.
#[derive(Clone)]
pub struct KeyedCache {
    prefix: String,
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
}

impl KeyedCache {
    /// Creates a namespace with no default TTL.
    pub fn new(prefix: impl Into<String>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
            ttl: None,
        }
    }

    /// Sets the TTL applied by `set`, `set_many` and `set_counter`.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the default TTL.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Expands a name into the full store key.
    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    /// Reads and decodes a value.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> CacheResult<Option<T>> {
        match self.store.get(&self.key(name))? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encodes and stores a value with the namespace TTL.
    pub fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> CacheResult<()> {
        self.set_with_ttl(name, value, self.ttl)
    }

    /// Encodes and stores a value with an explicit TTL.
    pub fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.store.set(&self.key(name), encode(value)?, ttl)
    }

    /// Stores a value only if the name is absent. Returns `true` if stored.
    pub fn add<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        self.store.add(&self.key(name), encode(value)?, ttl)
    }

    /// Reads several names at once.
    ///
    /// The result is keyed by the unprefixed name. Absent names, and entries
    /// that fail to decode, are omitted so callers treat both as misses.
    pub fn get_many<T: DeserializeOwned>(&self, names: &[String]) -> CacheResult<HashMap<String, T>> {
        let keys: Vec<String> = names.iter().map(|n| self.key(n)).collect();
        let found = self.store.get_many(&keys)?;

        Ok(names
            .iter()
            .zip(keys.iter())
            .filter_map(|(name, key)| {
                found
                    .get(key)
                    .and_then(|bytes| decode(bytes).ok())
                    .map(|value| (name.clone(), value))
            })
            .collect())
    }

    /// Stores several values with the namespace TTL.
    pub fn set_many<'a, T, I>(&self, entries: I) -> CacheResult<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (String, &'a T)>,
    {
        let encoded = entries
            .into_iter()
            .map(|(name, value)| Ok((self.key(&name), encode(value)?)))
            .collect::<CacheResult<Vec<_>>>()?;
        if encoded.is_empty() {
            return Ok(());
        }
        self.store.set_many(encoded, self.ttl)
    }

    /// Atomically increments a counter by one.
    ///
    /// Fails with `CacheError::NotFound` if the counter was never set or has
    /// expired; callers decide how to re-seed it.
    pub fn incr(&self, name: &str) -> CacheResult<i64> {
        self.store.incr(&self.key(name), 1)
    }

    /// Reads a counter.
    pub fn get_counter(&self, name: &str) -> CacheResult<Option<i64>> {
        let key = self.key(name);
        match self.store.get(&key)? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Some)
                .ok_or(CacheError::NotACounter { key }),
            None => Ok(None),
        }
    }

    /// Overwrites a counter with the namespace TTL.
    pub fn set_counter(&self, name: &str, value: i64) -> CacheResult<()> {
        self.store
            .set(&self.key(name), value.to_string().into_bytes(), self.ttl)
    }

    /// Sets a TTL on an existing name. Returns `false` if it is absent.
    pub fn expire(&self, name: &str, ttl: Duration) -> CacheResult<bool> {
        self.store.expire(&self.key(name), ttl)
    }

    /// Deletes a name. Returns `true` if it existed.
    pub fn delete(&self, name: &str) -> CacheResult<bool> {
        self.store.delete(&self.key(name))
    }

    /// Returns every decodable entry whose name starts with `pattern`.
    ///
    /// Names are returned without the namespace prefix, ordered as the
    /// backend orders them.
    pub fn scan<T: DeserializeOwned>(&self, pattern: &str) -> CacheResult<Vec<(String, T)>> {
        let full = self.key(pattern);
        let strip = self.prefix.len() + 1;

        Ok(self
            .store
            .scan_prefix(&full)?
            .into_iter()
            .filter_map(|(key, bytes)| {
                let value = decode(&bytes).ok()?;
                Some((key[strip..].to_string(), value))
            })
            .collect())
    }

    /// Deletes every name in this namespace. Returns the number removed.
    pub fn clear(&self) -> CacheResult<usize> {
        self.store.delete_prefix(&self.key(""))
    }
}

impl fmt::Debug for KeyedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CacheError::Codec(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CacheResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CacheError::Codec(e.to_string()))
}
