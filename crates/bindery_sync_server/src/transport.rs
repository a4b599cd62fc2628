//! Delivery of envelopes to subscribers.

use crate::error::TransportError;
use bindery_sync_protocol::SyncEnvelope;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Outbound channel to subscribers.
///
/// A recipient is either a group (every connection that joined it) or a
/// single connection's reply channel. Implementations must be thread-safe.
pub trait Transport: Send + Sync {
    /// Delivers one envelope to a recipient.
    fn send(&self, recipient: &str, envelope: &SyncEnvelope) -> Result<(), TransportError>;
}

/// An in-memory transport that records deliveries.
#[derive(Debug)]
pub struct MemoryTransport {
    connected: AtomicBool,
    sent: Mutex<Vec<(String, SyncEnvelope)>>,
    unknown: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    /// Creates a connected transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            unknown: Mutex::new(HashSet::new()),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes deliveries to `recipient` fail as unknown.
    pub fn forget(&self, recipient: impl Into<String>) {
        self.unknown.lock().insert(recipient.into());
    }

    /// Returns every delivery so far, in order.
    pub fn sent(&self) -> Vec<(String, SyncEnvelope)> {
        self.sent.lock().clone()
    }

    /// Returns the envelopes delivered to one recipient.
    pub fn sent_to(&self, recipient: &str) -> Vec<SyncEnvelope> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    /// Removes and returns every recorded delivery.
    pub fn take(&self) -> Vec<(String, SyncEnvelope)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, recipient: &str, envelope: &SyncEnvelope) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::unavailable("transport disconnected"));
        }
        if self.unknown.lock().contains(recipient) {
            return Err(TransportError::UnknownRecipient(recipient.to_string()));
        }
        self.sent
            .lock()
            .push((recipient.to_string(), envelope.clone()));
        Ok(())
    }
}
