//! Main sync server.

use crate::config::SyncConfig;
use crate::endpoint::SubscriptionEndpoint;
use crate::error::{ServerError, ServerResult, TransportError};
use crate::forwarder::RouteListeners;
use crate::full_sync::FullSync;
use crate::outbox::Outbox;
use crate::transport::Transport;
use bindery_core::{
    BindingDescriptor, CacheStore, ChangeDispatcher, DeliveryRoute, DispatcherConfig, RecordStore,
    StoreHook,
};
use bindery_sync_protocol::{JoinRequest, JoinResponse};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

/// The sync server.
///
/// Wires one process's dispatcher, outbox and subscription endpoints
/// together. Every process sharing the cache and record store runs its own
/// server; bindings published by one are kept current by all.
///
/// # Example
///
/// ```
/// use bindery_core::{BindingDescriptor, DispatcherConfig, InMemoryCacheStore, InMemoryRecordStore};
/// use bindery_sync_server::{MemoryTransport, SyncConfig, SyncServer};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(InMemoryRecordStore::new());
/// let server = SyncServer::new(
///     store.clone(),
///     Arc::new(InMemoryCacheStore::new()),
///     Arc::new(MemoryTransport::new()),
///     SyncConfig::default(),
///     DispatcherConfig::default(),
/// )?;
/// store.subscribe(server.hook());
///
/// server.publish(BindingDescriptor::new("Product", "all"), "products", "products:all");
/// let reply = server.handle_json("products", r#"{"version": 3}"#, "connection-1")?;
/// assert_eq!(reply, r#"{"joinGroups":["products:all"]}"#);
/// # Ok(())
/// # }
/// ```
pub struct SyncServer {
    dispatcher: Arc<ChangeDispatcher>,
    outbox: Arc<Outbox>,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    config: SyncConfig,
    runtime: Handle,
    endpoints: RwLock<HashMap<String, Arc<SubscriptionEndpoint>>>,
}

impl SyncServer {
    /// Creates a server on the current tokio runtime.
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
        dispatch: DispatcherConfig,
    ) -> ServerResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ServerError::Internal(format!("sync server needs a tokio runtime: {e}")))?;

        let dispatcher = ChangeDispatcher::with_runtime(
            store,
            Arc::clone(&cache),
            dispatch,
            runtime.clone(),
        );
        let outbox = Outbox::with_runtime(Arc::clone(&transport), config.clone(), runtime.clone());
        dispatcher.set_listener_factory(Arc::new(RouteListeners::new(Arc::clone(&outbox))));

        Ok(Self {
            dispatcher,
            outbox,
            transport,
            cache,
            config,
            runtime,
            endpoints: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the hook to subscribe to the record store.
    pub fn hook(&self) -> Arc<dyn StoreHook> {
        Arc::clone(&self.dispatcher) as Arc<dyn StoreHook>
    }

    /// Returns the change dispatcher.
    pub fn dispatcher(&self) -> &Arc<ChangeDispatcher> {
        &self.dispatcher
    }

    /// Returns the outbox.
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Publishes a binding under `event`, delivering its deltas to `group`.
    ///
    /// A descriptor without a route is routed to `(event, group)`. Publishing
    /// the same event again replaces its endpoint.
    pub fn publish(
        &self,
        descriptor: BindingDescriptor,
        event: &str,
        group: &str,
    ) -> Arc<SubscriptionEndpoint> {
        self.publish_with_config(descriptor, event, group, self.config.clone())
    }

    /// Like [`publish`](Self::publish), with full-sync paging set per endpoint.
    pub fn publish_with_config(
        &self,
        mut descriptor: BindingDescriptor,
        event: &str,
        group: &str,
        config: SyncConfig,
    ) -> Arc<SubscriptionEndpoint> {
        if descriptor.route.is_none() {
            descriptor.route = Some(DeliveryRoute::new(event, [group]));
        }
        let binding = self.dispatcher.bind(descriptor);
        let full_sync = FullSync::new(Arc::clone(&self.transport), Arc::clone(&self.cache), config);
        let endpoint = Arc::new(SubscriptionEndpoint::new(
            binding,
            event,
            group,
            full_sync,
            self.runtime.clone(),
        ));
        info!(event, group, binding = %endpoint.binding().key(), "binding published");
        self.endpoints
            .write()
            .insert(event.to_string(), Arc::clone(&endpoint));
        endpoint
    }

    /// Withdraws the endpoint for `event` and unbinds its binding.
    pub fn unpublish(&self, event: &str) -> bool {
        let Some(endpoint) = self.endpoints.write().remove(event) else {
            return false;
        };
        let binding = endpoint.binding();
        self.dispatcher.unbind(binding.record_type(), binding.name());
        true
    }

    /// Returns the endpoint serving `event`.
    pub fn endpoint(&self, event: &str) -> Option<Arc<SubscriptionEndpoint>> {
        self.endpoints.read().get(event).cloned()
    }

    /// Handles a join or disconnect for `event` from `recipient`.
    pub fn handle(
        &self,
        event: &str,
        request: &JoinRequest,
        recipient: &str,
    ) -> ServerResult<JoinResponse> {
        let endpoint = self
            .endpoint(event)
            .ok_or_else(|| ServerError::UnknownBinding(event.to_string()))?;
        endpoint.handle(request, recipient)
    }

    /// Handles a JSON-encoded join or disconnect; returns the JSON reply.
    pub fn handle_json(&self, event: &str, body: &str, recipient: &str) -> ServerResult<String> {
        let request = JoinRequest::from_json(body)?;
        let response = self.handle(event, &request, recipient)?;
        Ok(response.to_json()?)
    }

    /// Sends the pending delta batch for `(event, group)` now.
    pub fn flush(&self, event: &str, group: &str) -> Result<usize, TransportError> {
        self.outbox.flush(event, group)
    }
}
