//! Outbound message envelope.

use crate::error::ProtocolResult;
use crate::packet::SyncPacket;
use serde::{Deserialize, Serialize};

/// A batch of packets for one binding, as delivered to subscribers.
///
/// `version` and `lastModified` describe the binding when the batch was
/// sent; subscribers store the version and present it when they rejoin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    /// Event name the subscriber listens on.
    pub event: String,
    /// Binding name.
    pub binding: String,
    /// Binding version.
    pub version: u64,
    /// Milliseconds since the Unix epoch of the binding's last change.
    pub last_modified: Option<u64>,
    /// Name of the emitting server, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// The packets, in delivery order.
    pub events: Vec<SyncPacket>,
}

impl SyncEnvelope {
    /// Creates an envelope with no packets.
    pub fn new(
        event: impl Into<String>,
        binding: impl Into<String>,
        version: u64,
        last_modified: Option<u64>,
    ) -> Self {
        Self {
            event: event.into(),
            binding: binding.into(),
            version,
            last_modified,
            server: None,
            events: Vec::new(),
        }
    }

    /// Stamps the emitting server's name.
    #[must_use]
    pub fn with_server(mut self, server: Option<String>) -> Self {
        self.server = server;
        self
    }

    /// Sets the packets.
    #[must_use]
    pub fn with_events(mut self, events: Vec<SyncPacket>) -> Self {
        self.events = events;
        self
    }

    /// Appends one packet.
    pub fn push(&mut self, packet: SyncPacket) {
        self.events.push(packet);
    }

    /// Returns the number of packets.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the envelope carries no packets.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Encodes to JSON.
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from JSON.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn wire_shape() {
        let envelope = SyncEnvelope::new("products", "store", 4, Some(1_700_000_000_000))
            .with_events(vec![SyncPacket::delete(3)]);

        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "products",
                "binding": "store",
                "version": 4,
                "lastModified": 1_700_000_000_000u64,
                "events": [{"action": "delete", "payload": [{"id": 3}]}]
            })
        );
    }

    #[test]
    fn server_tag_is_optional() {
        let tagged = SyncEnvelope::new("products", "store", 1, None)
            .with_server(Some("web-1".into()));
        assert!(tagged.to_json().unwrap().contains("\"server\":\"web-1\""));

        let decoded = SyncEnvelope::from_json(
            r#"{"event":"e","binding":"b","version":2,"lastModified":null,"events":[]}"#,
        )
        .unwrap();
        assert_eq!(decoded.server, None);
        assert!(decoded.is_empty());
    }

    #[test]
    fn push_appends() {
        let mut envelope = SyncEnvelope::new("products", "all", 1, None);
        envelope.push(SyncPacket::sync_done(0));
        assert_eq!(envelope.len(), 1);
        assert!(envelope.events[0].is_sync_done());
    }
}
