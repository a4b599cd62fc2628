//! Binding and dispatcher configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache lifetimes for one binding.
///
/// Travels with the binding descriptor, so every process that materializes
/// the binding applies the same lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// TTL of the id-set, version and last-modified entries (`None` = no expiry).
    pub meta_ttl: Option<Duration>,

    /// TTL of cached record values (`None` = no expiry).
    pub value_ttl: Option<Duration>,

    /// How long a value lingers after leaving the view.
    ///
    /// Other bindings over the same record type may still reference it.
    pub value_grace: Duration,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            meta_ttl: None,
            value_ttl: None,
            value_grace: Duration::from_secs(60),
        }
    }
}

impl BindingConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the metadata TTL.
    #[must_use]
    pub const fn meta_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.meta_ttl = ttl;
        self
    }

    /// Sets the value TTL.
    #[must_use]
    pub const fn value_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.value_ttl = ttl;
        self
    }

    /// Sets the grace period for values leaving the view.
    #[must_use]
    pub const fn value_grace(mut self, grace: Duration) -> Self {
        self.value_grace = grace;
        self
    }
}

/// Configuration for a [`ChangeDispatcher`](crate::ChangeDispatcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Quiet period after the last save before bindings react.
    pub debounce_window: Duration,

    /// Lifetime of a registry entry; renewed every time the binding is bound.
    pub registry_ttl: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
            registry_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl DispatcherConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the debounce window.
    #[must_use]
    pub const fn debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Sets the registry entry lifetime.
    #[must_use]
    pub const fn registry_ttl(mut self, ttl: Duration) -> Self {
        self.registry_ttl = ttl;
        self
    }
}
