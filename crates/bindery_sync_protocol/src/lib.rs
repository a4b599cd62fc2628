//! # Bindery Sync Protocol
//!
//! Subscriber-facing message types for Bindery.
//!
//! This crate provides:
//! - [`SyncPacket`]: one delta or sync-page event (`create`, `update`,
//!   `delete`, `sync`)
//! - [`SyncEnvelope`]: a batch of packets stamped with the binding's
//!   version and last-modified time
//! - [`JoinRequest`] / [`JoinResponse`]: the subscription handshake
//! - JSON encoding and decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod envelope;
mod error;
mod packet;
mod subscription;

pub use envelope::SyncEnvelope;
pub use error::{ProtocolError, ProtocolResult};
pub use packet::{Action, SyncPacket, SYNC_DONE};
pub use subscription::{JoinRequest, JoinResponse};
