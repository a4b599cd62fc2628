//! Post-commit change notifications from the record store.
//!
//! The record store emits one event per committed save or delete. Hooks
//! registered with the feed are called synchronously, after the store has
//! released its own locks, in commit order.
//!
//! # Usage
//!
//! ```rust,ignore
//! use bindery_core::{InMemoryRecordStore, StoreHook};
//!
//! let store = InMemoryRecordStore::new();
//! store.subscribe(dispatcher.clone());
//!
//! // Hooks fire after the write is visible to readers
//! store.create("Product", fields)?;
//! ```

use crate::types::RecordId;
use parking_lot::RwLock;
use std::sync::Arc;

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Record was created.
    Created,
    /// Record already existed and was saved again.
    Updated,
    /// Record was deleted.
    Deleted,
}

/// Receiver of post-commit store notifications.
///
/// Implementations must not write back into the store from inside a hook.
pub trait StoreHook: Send + Sync {
    /// Called after a record was created or updated.
    fn record_saved(&self, record_type: &str, id: RecordId, created: bool);

    /// Called after a record was deleted.
    fn record_deleted(&self, record_type: &str, id: RecordId);
}

/// Distributes committed changes to registered hooks.
pub struct ChangeFeed {
    hooks: RwLock<Vec<Arc<dyn StoreHook>>>,
}

impl ChangeFeed {
    /// Creates a feed with no hooks.
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Registers a hook for all future changes.
    pub fn subscribe(&self, hook: Arc<dyn StoreHook>) {
        self.hooks.write().push(hook);
    }

    /// Emits a change to every hook.
    pub fn emit(&self, record_type: &str, record_id: RecordId, change_type: ChangeType) {
        // Hooks may take their own locks; never call them under ours.
        let hooks = self.hooks.read().clone();
        for hook in hooks {
            match change_type {
                ChangeType::Created => hook.record_saved(record_type, record_id, true),
                ChangeType::Updated => hook.record_saved(record_type, record_id, false),
                ChangeType::Deleted => hook.record_deleted(record_type, record_id),
            }
        }
    }

    /// Returns the number of registered hooks.
    pub fn subscriber_count(&self) -> usize {
        self.hooks.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
