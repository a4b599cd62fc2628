//! Sync delivery configuration.

use std::time::Duration;

/// Configuration for delta batching and full sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Records per full-sync page.
    pub page_size: usize,
    /// Pause between full-sync pages.
    pub page_interval: Duration,
    /// Delay between the first queued delta and its batch being sent.
    pub flush_delay: Duration,
    /// Queue length above which a batch is sent at once.
    pub flush_threshold: usize,
    /// Lifetime of the per-recipient full-sync lock.
    pub sync_lock_ttl: Duration,
    /// Name stamped on outgoing envelopes.
    pub server_name: Option<String>,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            page_size: 100,
            page_interval: Duration::from_millis(100),
            flush_delay: Duration::from_millis(500),
            flush_threshold: 25,
            sync_lock_ttl: Duration::from_secs(5 * 60),
            server_name: None,
        }
    }

    /// Sets the full-sync page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the pause between full-sync pages.
    pub fn with_page_interval(mut self, interval: Duration) -> Self {
        self.page_interval = interval;
        self
    }

    /// Sets the batch flush delay.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Sets the batch size threshold.
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Sets the full-sync lock lifetime.
    pub fn with_sync_lock_ttl(mut self, ttl: Duration) -> Self {
        self.sync_lock_ttl = ttl;
        self
    }

    /// Sets the server name stamped on envelopes.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.flush_threshold, 25);
        assert_eq!(config.sync_lock_ttl, Duration::from_secs(300));
        assert!(config.server_name.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = SyncConfig::new()
            .with_page_size(2)
            .with_flush_delay(Duration::from_millis(100))
            .with_server_name("web-1");

        assert_eq!(config.page_size, 2);
        assert_eq!(config.flush_delay, Duration::from_millis(100));
        assert_eq!(config.server_name.as_deref(), Some("web-1"));
    }
}
