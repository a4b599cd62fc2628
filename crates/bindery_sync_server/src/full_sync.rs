//! Paginated full-state delivery.
//!
//! A full sync sends a binding's members to one recipient as numbered pages
//! and then the `"ok"` sentinel. A per-`(event, recipient)` lock in the
//! shared cache keeps two syncs to the same recipient from interleaving,
//! even when the joins land on different processes.

use crate::config::SyncConfig;
use crate::error::ServerResult;
use crate::transport::Transport;
use bindery_core::{Binding, CacheStore, KeyedCache, Record};
use bindery_sync_protocol::{SyncEnvelope, SyncPacket};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespace of in-flight sync locks.
pub const SYNC_LOCK_PREFIX: &str = "sync-lock";

/// Result of a full-sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Pages and sentinel were sent.
    Delivered {
        /// Number of pages sent before the sentinel.
        pages: u32,
    },
    /// Another sync to the same recipient is still running.
    AlreadyRunning,
}

/// Streams bindings to recipients page by page.
#[derive(Clone)]
pub struct FullSync {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    locks: KeyedCache,
}

impl FullSync {
    /// Creates a full-sync driver whose locks live in `cache`.
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn CacheStore>, config: SyncConfig) -> Self {
        Self {
            locks: KeyedCache::new(SYNC_LOCK_PREFIX, cache).with_ttl(Some(config.sync_lock_ttl)),
            transport,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Sends every member of `binding` to `recipient`, then the sentinel.
    ///
    /// If the lock cache is unreachable the sync runs unguarded.
    pub async fn run(
        &self,
        binding: &Binding,
        event: &str,
        recipient: &str,
    ) -> ServerResult<SyncOutcome> {
        let lock = format!("{event}:{recipient}");
        let acquired = match self.locks.add(&lock, &true, self.locks.ttl()) {
            Ok(acquired) => acquired,
            Err(err) => {
                warn!(binding = %binding.key(), recipient, error = %err, "sync lock unavailable, syncing unguarded");
                true
            }
        };
        if !acquired {
            debug!(binding = %binding.key(), recipient, "full sync already in flight");
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let result = self.stream(binding, event, recipient).await;
        if let Err(err) = self.locks.delete(&lock) {
            warn!(binding = %binding.key(), recipient, error = %err, "sync lock not released");
        }
        result
    }

    /// Sends only the sentinel, telling `recipient` it is current.
    pub fn acknowledge(&self, binding: &Binding, event: &str, recipient: &str) -> ServerResult<()> {
        self.send(binding, event, recipient, SyncPacket::sync_done(0))
    }

    async fn stream(
        &self,
        binding: &Binding,
        event: &str,
        recipient: &str,
    ) -> ServerResult<SyncOutcome> {
        let ids = binding.keys()?;
        let page_size = self.config.page_size.max(1);
        let pages = u32::try_from(ids.len().div_ceil(page_size)).unwrap_or(u32::MAX);
        info!(binding = %binding.key(), recipient, records = ids.len(), pages, "full sync started");

        for (index, chunk) in ids.chunks(page_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.page_interval).await;
            }
            let records: Vec<_> = binding.records(chunk)?.iter().map(Record::to_value).collect();
            let page = u32::try_from(index + 1).unwrap_or(u32::MAX);
            self.send(binding, event, recipient, SyncPacket::sync_page(records, page, pages))?;
        }

        self.send(binding, event, recipient, SyncPacket::sync_done(pages))?;
        debug!(binding = %binding.key(), recipient, pages, "full sync finished");
        Ok(SyncOutcome::Delivered { pages })
    }

    fn send(
        &self,
        binding: &Binding,
        event: &str,
        recipient: &str,
        packet: SyncPacket,
    ) -> ServerResult<()> {
        let meta = binding.metadata();
        let envelope = SyncEnvelope::new(
            event,
            meta.name,
            meta.version,
            meta.last_modified.map(|t| t.as_millis()),
        )
        .with_server(self.config.server_name.clone())
        .with_events(vec![packet]);
        self.transport.send(recipient, &envelope)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use bindery_core::{
        BindingDescriptor, Filter, InMemoryCacheStore, InMemoryRecordStore, RecordStore,
    };
    use std::time::Duration;

    struct Fixture {
        cache: Arc<InMemoryCacheStore>,
        transport: Arc<MemoryTransport>,
        binding: Binding,
    }

    fn fixture(products: usize) -> Fixture {
        let store = Arc::new(InMemoryRecordStore::new());
        for n in 0..products {
            store
                .create("Product", Record::new(0).with("name", format!("t{n}")).with("venue", "store").fields)
                .unwrap();
        }
        store
            .create("Product", Record::new(0).with("name", "other").with("venue", "online").fields)
            .unwrap();

        let cache = Arc::new(InMemoryCacheStore::new());
        let binding = Binding::new(
            BindingDescriptor::new("Product", "store").with_filter(Filter::new().eq("venue", "store")),
            store as Arc<dyn RecordStore>,
            cache.clone(),
        );
        Fixture {
            cache,
            transport: Arc::new(MemoryTransport::new()),
            binding,
        }
    }

    fn sync(fx: &Fixture, page_size: usize) -> FullSync {
        FullSync::new(
            fx.transport.clone(),
            fx.cache.clone(),
            SyncConfig::default().with_page_size(page_size),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pages_then_sentinel() {
        let fx = fixture(5);
        let outcome = sync(&fx, 2).run(&fx.binding, "products", "ch-1").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Delivered { pages: 3 });

        let sent = fx.transport.sent_to("ch-1");
        assert_eq!(sent.len(), 4);
        let sizes: Vec<usize> = sent[..3]
            .iter()
            .map(|e| e.events[0].payload.as_array().map_or(0, Vec::len))
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(sent[2].events[0].page, Some(3));
        assert!(sent[3].events[0].is_sync_done());
        assert_eq!(sent[3].events[0].pages, Some(3));
        assert_eq!(sent[3].version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_binding_sends_only_sentinel() {
        let fx = fixture(0);
        let outcome = sync(&fx, 100).run(&fx.binding, "products", "ch-1").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Delivered { pages: 0 });
        let sent = fx.transport.sent_to("ch-1");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].events[0].is_sync_done());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sync_to_same_recipient_is_skipped() {
        let fx = fixture(3);
        let driver = sync(&fx, 1);
        fx.cache
            .set("sync-lock:products:ch-1", vec![1], Some(Duration::from_secs(60)))
            .unwrap();

        let outcome = driver.run(&fx.binding, "products", "ch-1").await.unwrap();
        assert_eq!(outcome, SyncOutcome::AlreadyRunning);
        assert!(fx.transport.sent().is_empty());

        // other recipients are unaffected
        driver.run(&fx.binding, "products", "ch-2").await.unwrap();
        assert_eq!(fx.transport.sent_to("ch-2").len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_released_after_sync() {
        let fx = fixture(1);
        let driver = sync(&fx, 100);
        driver.run(&fx.binding, "products", "ch-1").await.unwrap();
        driver.run(&fx.binding, "products", "ch-1").await.unwrap();
        assert_eq!(fx.transport.sent_to("ch-1").len(), 4);
        assert!(fx.cache.get("sync-lock:products:ch-1").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_surfaces_and_releases_lock() {
        let fx = fixture(2);
        let driver = sync(&fx, 100);
        fx.transport.set_connected(false);
        assert!(driver.run(&fx.binding, "products", "ch-1").await.is_err());

        fx.transport.set_connected(true);
        assert!(matches!(
            driver.run(&fx.binding, "products", "ch-1").await.unwrap(),
            SyncOutcome::Delivered { pages: 1 }
        ));
    }

    #[test]
    fn acknowledge_sends_sentinel_only() {
        let fx = fixture(2);
        sync(&fx, 100)
            .acknowledge(&fx.binding, "products", "ch-1")
            .unwrap();
        let sent = fx.transport.sent_to("ch-1");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].events.len(), 1);
        assert!(sent[0].events[0].is_sync_done());
    }
}
