//! Binding listeners that turn changes into outbound deltas.

use crate::outbox::Outbox;
use bindery_core::{
    BindingChange, BindingDescriptor, BindingListener, ChangeAction, DeliveryRoute,
    ListenerFactory, ListenerId,
};
use bindery_sync_protocol::SyncPacket;
use std::sync::Arc;
use tracing::trace;

/// Queues every accepted change of a binding for the groups of its route.
pub struct DeltaForwarder {
    route: DeliveryRoute,
    outbox: Arc<Outbox>,
}

impl DeltaForwarder {
    /// Creates a forwarder for `route`.
    pub fn new(route: DeliveryRoute, outbox: Arc<Outbox>) -> Self {
        Self { route, outbox }
    }

    /// Returns the route.
    pub fn route(&self) -> &DeliveryRoute {
        &self.route
    }

    fn packet(change: &BindingChange) -> SyncPacket {
        match change.action {
            ChangeAction::Create => SyncPacket::create(change.record.to_value()),
            ChangeAction::Update => SyncPacket::update(change.record.to_value()),
            ChangeAction::Delete => SyncPacket::delete(change.record.id.as_u64()),
        }
    }
}

impl BindingListener for DeltaForwarder {
    // one forwarder per route, however many times a binding is equipped
    fn id(&self) -> ListenerId {
        ListenerId::new(format!(
            "route:{}:{}",
            self.route.event,
            self.route.groups.join(",")
        ))
    }

    fn on_change(&self, change: &BindingChange) {
        let packet = Self::packet(change);
        trace!(
            event = %self.route.event,
            action = %change.action,
            record_id = %change.record.id,
            version = change.binding.version,
            "delta queued"
        );
        for group in &self.route.groups {
            self.outbox
                .enqueue(&self.route.event, group, &change.binding, packet.clone());
        }
    }
}

/// Equips routed bindings with a [`DeltaForwarder`].
pub struct RouteListeners {
    outbox: Arc<Outbox>,
}

impl RouteListeners {
    /// Creates a factory forwarding into `outbox`.
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self { outbox }
    }
}

impl ListenerFactory for RouteListeners {
    fn listener_for(&self, descriptor: &BindingDescriptor) -> Option<Arc<dyn BindingListener>> {
        let route = descriptor.route.clone()?;
        Some(Arc::new(DeltaForwarder::new(route, Arc::clone(&self.outbox))))
    }
}
