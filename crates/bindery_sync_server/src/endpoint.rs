//! Subscriber join, leave and version check.

use crate::error::ServerResult;
use crate::full_sync::{FullSync, SyncOutcome};
use bindery_core::Binding;
use bindery_sync_protocol::{JoinRequest, JoinResponse};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error};

/// Serves one binding to subscribers of one event.
///
/// Joining adds the connection to `group`, where live deltas arrive. The
/// connection's own reply channel receives either a full sync or, when its
/// claimed version is current, only the sentinel.
pub struct SubscriptionEndpoint {
    binding: Arc<Binding>,
    event: String,
    group: String,
    full_sync: FullSync,
    runtime: Handle,
}

impl SubscriptionEndpoint {
    /// Creates an endpoint whose full syncs run on `runtime`.
    pub fn new(
        binding: Arc<Binding>,
        event: impl Into<String>,
        group: impl Into<String>,
        full_sync: FullSync,
        runtime: Handle,
    ) -> Self {
        Self {
            binding,
            event: event.into(),
            group: group.into(),
            full_sync,
            runtime,
        }
    }

    /// Returns the binding served.
    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    /// Returns the event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Returns the delta group subscribers join.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Handles a join or disconnect from the connection `recipient`.
    ///
    /// A join whose claimed version is absent, unreadable or different from
    /// the binding's starts a full sync in the background. The response is
    /// returned before any page is sent.
    pub fn handle(&self, request: &JoinRequest, recipient: &str) -> ServerResult<JoinResponse> {
        if request.disconnect {
            debug!(event = %self.event, recipient, "subscriber left");
            return Ok(JoinResponse::Leave(vec![self.group.clone()]));
        }

        self.binding.ensure_loaded()?;
        let current = self.binding.version();
        match request.claimed_version() {
            Some(claimed) if claimed == current => {
                debug!(event = %self.event, recipient, version = current, "subscriber current");
                self.full_sync
                    .acknowledge(&self.binding, &self.event, recipient)?;
            }
            claimed => {
                debug!(
                    event = %self.event,
                    recipient,
                    claimed,
                    version = current,
                    "subscriber stale, scheduling full sync"
                );
                self.spawn_sync(recipient);
            }
        }
        Ok(JoinResponse::Join(vec![self.group.clone()]))
    }

    /// Runs a full sync to `recipient` and waits for it.
    pub async fn sync(&self, recipient: &str) -> ServerResult<SyncOutcome> {
        self.full_sync
            .run(&self.binding, &self.event, recipient)
            .await
    }

    fn spawn_sync(&self, recipient: &str) {
        let binding = Arc::clone(&self.binding);
        let full_sync = self.full_sync.clone();
        let event = self.event.clone();
        let recipient = recipient.to_string();
        self.runtime.spawn(async move {
            if let Err(err) = full_sync.run(&binding, &event, &recipient).await {
                error!(
                    binding = %binding.key(),
                    event = %event,
                    recipient = %recipient,
                    error = %err,
                    "full sync failed"
                );
            }
        });
    }
}
