//! # Bindery Core
//!
//! Cache-backed reactive views over an authoritative record store.
//!
//! This crate provides:
//! - [`Binding`]: a named, filtered view whose id-set, values, version and
//!   last-modified time live in a shared cache
//! - [`BindingRegistry`]: a cache-resident directory of bindings, so any
//!   process can find the bindings another process declared
//! - [`ChangeDispatcher`]: the store hook that routes committed changes to
//!   every binding over the changed record type, debouncing saves
//! - [`RecordStore`] and [`InMemoryRecordStore`]: the authoritative side
//!
//! ## Example
//!
//! ```rust
//! use bindery_core::{
//!     Binding, BindingDescriptor, Filter, InMemoryCacheStore, InMemoryRecordStore, Record,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryRecordStore::new());
//! store.create("Product", Record::new(0).with("venue", "store").fields).unwrap();
//! store.create("Product", Record::new(0).with("venue", "online").fields).unwrap();
//!
//! let binding = Binding::new(
//!     BindingDescriptor::new("Product", "store").with_filter(Filter::new().eq("venue", "store")),
//!     store,
//!     Arc::new(InMemoryCacheStore::new()),
//! );
//! assert_eq!(binding.all().unwrap().len(), 1);
//! assert_eq!(binding.version(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod binding;
mod change_feed;
mod config;
mod descriptor;
mod dispatcher;
mod error;
mod filter;
mod listener;
mod record;
mod registry;
mod store;
mod types;

pub use binding::{Binding, BindingMetadata};
pub use change_feed::{ChangeFeed, ChangeType, StoreHook};
pub use config::{BindingConfig, DispatcherConfig};
pub use descriptor::{binding_key, key_part, BindingDescriptor, DeliveryRoute};
pub use dispatcher::{ChangeDispatcher, DEBOUNCE_PREFIX};
pub use error::{CoreError, CoreResult};
pub use filter::Filter;
pub use listener::{
    BindingChange, BindingListener, ChangeAction, FnListener, ListenerFactory, ListenerId,
};
pub use record::{Fields, Record};
pub use registry::{BindingRegistry, REGISTRY_PREFIX};
pub use store::{InMemoryRecordStore, RecordStore};
pub use types::{RecordId, Timestamp};

// Re-export the cache layer so downstream crates need a single dependency.
pub use bindery_cache::{CacheError, CacheStore, InMemoryCacheStore, KeyedCache};
