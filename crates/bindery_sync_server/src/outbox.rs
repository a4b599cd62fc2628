//! Per-recipient batching of delta packets.
//!
//! Each `(event, group)` pair has its own queue. The first packet into an
//! idle queue arms a flush timer and records its token; later packets only
//! append. When the timer fires it flushes only if the queue still carries
//! its token, so a timer whose batch was already sent (because the queue
//! grew past the threshold) does nothing.
//!
//! Queues are process-local. Deltas observed by different processes are
//! batched independently.

use crate::config::SyncConfig;
use crate::error::{ServerError, ServerResult, TransportError};
use crate::transport::Transport;
use bindery_core::BindingMetadata;
use bindery_sync_protocol::{SyncEnvelope, SyncPacket};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, error, trace};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueueKey {
    event: String,
    group: String,
}

/// A pending batch. Absent from the map while idle.
struct Queue {
    token: u64,
    binding: String,
    version: u64,
    last_modified: Option<u64>,
    packets: Vec<SyncPacket>,
}

/// Batches delta packets per `(event, group)` and sends them as envelopes.
pub struct Outbox {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    queues: Mutex<HashMap<QueueKey, Queue>>,
    tokens: AtomicU64,
    runtime: Handle,
    this: Weak<Outbox>,
}

impl Outbox {
    /// Creates an outbox whose flush timers run on the current runtime.
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> ServerResult<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| ServerError::Internal(format!("outbox needs a tokio runtime: {e}")))?;
        Ok(Self::with_runtime(transport, config, runtime))
    }

    /// Creates an outbox whose flush timers run on `runtime`.
    pub fn with_runtime(
        transport: Arc<dyn Transport>,
        config: SyncConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            transport,
            config,
            queues: Mutex::new(HashMap::new()),
            tokens: AtomicU64::new(0),
            runtime,
            this: this.clone(),
        })
    }

    /// Queues a packet for `group` under `event`.
    ///
    /// The envelope is stamped with the binding state of the most recent
    /// packet in the batch.
    pub fn enqueue(&self, event: &str, group: &str, binding: &BindingMetadata, packet: SyncPacket) {
        let key = QueueKey {
            event: event.to_string(),
            group: group.to_string(),
        };

        let mut armed = None;
        let ready = {
            let mut queues = self.queues.lock();
            let queue = queues.entry(key.clone()).or_insert_with(|| {
                let token = self.tokens.fetch_add(1, Ordering::SeqCst) + 1;
                armed = Some(token);
                Queue {
                    token,
                    binding: String::new(),
                    version: 0,
                    last_modified: None,
                    packets: Vec::new(),
                }
            });
            queue.binding.clone_from(&binding.name);
            queue.version = binding.version;
            queue.last_modified = binding.last_modified.map(|t| t.as_millis());
            queue.packets.push(packet);

            if queue.packets.len() > self.config.flush_threshold {
                queues.remove(&key).map(|queue| self.envelope(event, queue))
            } else {
                None
            }
        };

        if let Some(envelope) = ready {
            debug!(event, group, packets = envelope.len(), "batch threshold exceeded, flushing");
            // logged in deliver
            let _ = self.deliver(group, &envelope);
            return;
        }
        if let Some(token) = armed {
            self.arm(key, token);
        }
    }

    /// Sends the pending batch for `(event, group)` now.
    ///
    /// Returns the number of packets sent. The batch is dropped if the
    /// transport fails.
    pub fn flush(&self, event: &str, group: &str) -> Result<usize, TransportError> {
        let key = QueueKey {
            event: event.to_string(),
            group: group.to_string(),
        };
        let Some(queue) = self.queues.lock().remove(&key) else {
            return Ok(0);
        };
        let envelope = self.envelope(event, queue);
        self.deliver(group, &envelope)?;
        Ok(envelope.len())
    }

    /// Returns the number of packets waiting for `(event, group)`.
    pub fn pending(&self, event: &str, group: &str) -> usize {
        self.queues
            .lock()
            .get(&QueueKey {
                event: event.to_string(),
                group: group.to_string(),
            })
            .map_or(0, |queue| queue.packets.len())
    }

    fn arm(&self, key: QueueKey, token: u64) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let delay = self.config.flush_delay;
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            this.flush_if_current(&key, token);
        });
    }

    fn flush_if_current(&self, key: &QueueKey, token: u64) {
        let queue = {
            let mut queues = self.queues.lock();
            match queues.get(key) {
                Some(queue) if queue.token == token => queues.remove(key),
                _ => None,
            }
        };
        let Some(queue) = queue else {
            trace!(event = %key.event, group = %key.group, token, "stale flush token");
            return;
        };

        let envelope = self.envelope(&key.event, queue);
        let _ = self.deliver(&key.group, &envelope);
    }

    fn envelope(&self, event: &str, queue: Queue) -> SyncEnvelope {
        SyncEnvelope::new(event, queue.binding, queue.version, queue.last_modified)
            .with_server(self.config.server_name.clone())
            .with_events(queue.packets)
    }

    fn deliver(&self, group: &str, envelope: &SyncEnvelope) -> Result<(), TransportError> {
        self.transport.send(group, envelope).map_err(|err| {
            error!(
                event = %envelope.event,
                group,
                packets = envelope.len(),
                retryable = err.is_retryable(),
                error = %err,
                "delta batch not delivered"
            );
            err
        })
    }
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("config", &self.config)
            .field("queues", &self.queues.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::time::Duration;

    fn metadata(version: u64) -> BindingMetadata {
        BindingMetadata {
            record_type: "Product".into(),
            name: "store".into(),
            version,
            last_modified: None,
        }
    }

    fn outbox(config: SyncConfig) -> (Arc<MemoryTransport>, Arc<Outbox>) {
        let transport = Arc::new(MemoryTransport::new());
        let outbox = Outbox::new(transport.clone(), config).unwrap();
        (transport, outbox)
    }

    async fn past_flush() {
        tokio::time::sleep(Duration::from_millis(510)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn packets_are_batched() {
        let (transport, outbox) = outbox(SyncConfig::default());
        for id in 1..=3 {
            outbox.enqueue("products", "g", &metadata(id), SyncPacket::delete(id));
        }
        assert_eq!(outbox.pending("products", "g"), 3);
        assert!(transport.sent().is_empty());

        past_flush().await;
        let sent = transport.sent_to("g");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].events.len(), 3);
        assert_eq!(sent[0].version, 3);
        assert_eq!(sent[0].binding, "store");
        assert_eq!(outbox.pending("products", "g"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_flushes_immediately_without_double_send() {
        let (transport, outbox) = outbox(SyncConfig::default().with_flush_threshold(2));
        for id in 1..=3 {
            outbox.enqueue("products", "g", &metadata(1), SyncPacket::delete(id));
        }
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.sent()[0].1.events.len(), 3);

        // the original timer fires against an idle queue
        past_flush().await;
        assert_eq!(transport.sent().len(), 1);

        outbox.enqueue("products", "g", &metadata(2), SyncPacket::delete(4));
        past_flush().await;
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn queues_are_per_group_and_event() {
        let (transport, outbox) = outbox(SyncConfig::default());
        let packet = SyncPacket::create(json!({"id": 1}));
        outbox.enqueue("products", "a", &metadata(1), packet.clone());
        outbox.enqueue("products", "b", &metadata(1), packet.clone());
        outbox.enqueue("orders", "a", &metadata(1), packet);

        past_flush().await;
        assert_eq!(transport.sent().len(), 3);
        assert_eq!(transport.sent_to("a").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_flush_disarms_timer() {
        let (transport, outbox) = outbox(SyncConfig::default());
        outbox.enqueue("products", "g", &metadata(1), SyncPacket::delete(1));
        assert_eq!(outbox.flush("products", "g").unwrap(), 1);
        assert_eq!(outbox.flush("products", "g").unwrap(), 0);

        past_flush().await;
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_drops_batch() {
        let (transport, outbox) = outbox(SyncConfig::default());
        transport.set_connected(false);
        outbox.enqueue("products", "g", &metadata(1), SyncPacket::delete(1));
        assert!(outbox.flush("products", "g").unwrap_err().is_retryable());

        transport.set_connected(true);
        past_flush().await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn server_name_is_stamped() {
        let (transport, outbox) = outbox(SyncConfig::default().with_server_name("web-2"));
        outbox.enqueue("products", "g", &metadata(1), SyncPacket::delete(1));
        past_flush().await;
        assert_eq!(transport.sent()[0].1.server.as_deref(), Some("web-2"));
    }
}
