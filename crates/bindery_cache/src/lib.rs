//! # Bindery Cache
//!
//! Cache store trait and implementations for Bindery.
//!
//! This crate provides the lowest-level cache abstraction. Cache stores are
//! **opaque byte stores** keyed by strings - they do not interpret the values
//! they hold, with the single exception of counters, which are stored as
//! decimal text so that `incr` can be performed atomically by the backend.
//!
//! ## Design Principles
//!
//! - Backends are simple key-value stores with optional per-key TTL
//! - Atomicity is per key only; batch operations are conveniences
//! - Must be `Send + Sync` so one store can be shared by many bindings
//! - [`KeyedCache`] owns namespacing and value encoding (CBOR)
//!
//! ## Available Backends
//!
//! - [`InMemoryCacheStore`] - For tests and single-process deployments
//!
//! ## Example
//!
//! ```rust
//! use bindery_cache::{InMemoryCacheStore, KeyedCache};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryCacheStore::new());
//! let cache = KeyedCache::new("binding:Product:all", store);
//!
//! cache.set("name", &"all".to_string()).unwrap();
//! assert_eq!(cache.get::<String>("name").unwrap().as_deref(), Some("all"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod keyed;
mod memory;
mod store;

pub use error::{CacheError, CacheResult};
pub use keyed::KeyedCache;
pub use memory::InMemoryCacheStore;
pub use store::CacheStore;
