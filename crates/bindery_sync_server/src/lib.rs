//! # Bindery Sync Server
//!
//! Live delivery of binding state to remote subscribers.
//!
//! This crate provides:
//! - Delta batching per `(event, group)` with token-checked flush timers
//! - Paginated full sync ending in the `"ok"` sentinel
//! - Subscription endpoints answering join, leave and version checks
//! - A [`Transport`] seam with an in-memory implementation for tests
//!
//! # Architecture
//!
//! Each process runs one [`SyncServer`] over the shared cache and record
//! store. Publishing a binding registers it with a delivery route; every
//! process that discovers the binding attaches a [`DeltaForwarder`] for
//! that route, so a change is forwarded by whichever process observed it.
//!
//! # Protocol
//!
//! 1. A subscriber joins an event, claiming the last version it holds
//! 2. The server answers with the group to join for live deltas
//! 3. A stale or missing claim triggers a full sync to the subscriber's own
//!    channel; a current claim gets only the sentinel
//! 4. Deltas for the group arrive in batches stamped with the new version

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod endpoint;
mod error;
mod forwarder;
mod full_sync;
mod outbox;
mod server;
mod transport;

pub use config::SyncConfig;
pub use endpoint::SubscriptionEndpoint;
pub use error::{ServerError, ServerResult, TransportError};
pub use forwarder::{DeltaForwarder, RouteListeners};
pub use full_sync::{FullSync, SyncOutcome, SYNC_LOCK_PREFIX};
pub use outbox::Outbox;
pub use server::SyncServer;
pub use transport::{MemoryTransport, Transport};
