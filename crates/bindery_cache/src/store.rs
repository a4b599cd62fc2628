//! Cache store trait definition.

use crate::error::CacheResult;
use std::collections::HashMap;
use std::time::Duration;

/// A low-level key-value cache backend.
///
/// Cache stores are **opaque byte stores**. They provide get/set with an
/// optional TTL, batch variants, an atomic increment and a prefix scan.
/// Bindery owns all value interpretation.
///
/// # Invariants
///
/// - A key whose TTL has elapsed behaves exactly like an absent key
/// - `incr` is atomic with respect to other `incr` calls on the same key
/// - `incr` never creates a key: an absent key yields `CacheError::NotFound`
/// - `incr` and `expire` preserve the value's representation as decimal text
/// - Batch operations are not transactional
///
/// # Implementors
///
/// - [`super::InMemoryCacheStore`] - For testing and single-process use
pub trait CacheStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the backend cannot be reached.
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// A `ttl` of `None` keeps the entry until it is deleted.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Stores `value` only if `key` is absent.
    ///
    /// Returns `true` if the value was stored.
    fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Reads several keys at once. Absent keys are omitted from the result.
    fn get_many(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>>;

    /// Stores several entries with a shared TTL.
    fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Atomically adds `delta` to the integer stored under `key`.
    ///
    /// # Errors
    ///
    /// - `CacheError::NotFound` if the key is absent or expired
    /// - `CacheError::NotACounter` if the value is not decimal text
    fn incr(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Sets a new TTL on an existing key.
    ///
    /// Returns `false` if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Deletes a key. Returns `true` if it existed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Returns all live entries whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, prefix: &str) -> CacheResult<Vec<(String, Vec<u8>)>>;

    /// Deletes all keys starting with `prefix`. Returns the number removed.
    fn delete_prefix(&self, prefix: &str) -> CacheResult<usize>;
}
