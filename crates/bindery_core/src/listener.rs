//! Change listeners attached to bindings.

use crate::binding::BindingMetadata;
use crate::descriptor::BindingDescriptor;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of change a binding observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Record entered the view.
    Create,
    /// Record in the view changed.
    Update,
    /// Record left the view.
    Delete,
}

impl ChangeAction {
    /// Returns the lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingChange {
    /// What happened.
    pub action: ChangeAction,
    /// The record snapshot. For deletes this is the last known value, or a
    /// stub carrying only the id.
    pub record: Record,
    /// Binding state after the change was applied.
    pub binding: BindingMetadata,
}

/// Stable identity of a listener; a binding holds at most one listener per id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(String);

impl ListenerId {
    /// Creates an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListenerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ListenerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receives the changes a binding accepts.
///
/// Called synchronously on the thread that applied the change. Listeners
/// should hand work off rather than block.
pub trait BindingListener: Send + Sync {
    /// Returns the listener's identity.
    fn id(&self) -> ListenerId;

    /// Handles one accepted change.
    fn on_change(&self, change: &BindingChange);
}

/// Builds listeners for bindings a dispatcher discovers in the registry.
///
/// Listeners cannot cross process boundaries; a descriptor's route can.
/// Each process installs a factory that turns routes back into listeners.
pub trait ListenerFactory: Send + Sync {
    /// Returns the listener for a discovered binding, if it needs one.
    fn listener_for(&self, descriptor: &BindingDescriptor) -> Option<Arc<dyn BindingListener>>;
}

/// A listener backed by a closure.
pub struct FnListener<F> {
    id: ListenerId,
    callback: F,
}

impl<F> FnListener<F>
where
    F: Fn(&BindingChange) + Send + Sync,
{
    /// Wraps a closure under the given id.
    pub fn new(id: impl Into<ListenerId>, callback: F) -> Self {
        Self {
            id: id.into(),
            callback,
        }
    }
}

impl<F> BindingListener for FnListener<F>
where
    F: Fn(&BindingChange) + Send + Sync,
{
    fn id(&self) -> ListenerId {
        self.id.clone()
    }

    fn on_change(&self, change: &BindingChange) {
        (self.callback)(change);
    }
}
