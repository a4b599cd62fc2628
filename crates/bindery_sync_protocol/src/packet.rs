//! Individual sync events.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Payload of the packet that ends a sync.
pub const SYNC_DONE: &str = "ok";

/// What a packet tells the subscriber to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Add the payload record.
    Create,
    /// Replace the payload record.
    Update,
    /// Remove the records whose ids are listed.
    Delete,
    /// One page of a full sync, or its completion sentinel.
    Sync,
}

/// One event delivered to a subscriber.
///
/// Payload shapes by action:
///
/// | Action   | Payload                       |
/// |----------|-------------------------------|
/// | `create` | record object                 |
/// | `update` | record object                 |
/// | `delete` | `[{"id": ...}]`               |
/// | `sync`   | array of records, or `"ok"`   |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPacket {
    /// Event kind.
    pub action: Action,
    /// Event data.
    pub payload: Value,
    /// 1-based page number of a sync page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Total page count of the sync this packet belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
}

impl SyncPacket {
    fn new(action: Action, payload: Value) -> Self {
        Self {
            action,
            payload,
            page: None,
            pages: None,
        }
    }

    /// A record entered the view.
    pub fn create(record: Value) -> Self {
        Self::new(Action::Create, record)
    }

    /// A record in the view changed.
    pub fn update(record: Value) -> Self {
        Self::new(Action::Update, record)
    }

    /// A record left the view.
    pub fn delete(id: u64) -> Self {
        Self::new(Action::Delete, json!([{ "id": id }]))
    }

    /// One page of a full sync.
    pub fn sync_page(records: Vec<Value>, page: u32, pages: u32) -> Self {
        Self {
            page: Some(page),
            pages: Some(pages),
            ..Self::new(Action::Sync, Value::Array(records))
        }
    }

    /// The completion sentinel after `pages` sync pages.
    pub fn sync_done(pages: u32) -> Self {
        Self {
            pages: Some(pages),
            ..Self::new(Action::Sync, Value::from(SYNC_DONE))
        }
    }

    /// Returns true for the completion sentinel.
    pub fn is_sync_done(&self) -> bool {
        self.action == Action::Sync && self.payload.as_str() == Some(SYNC_DONE)
    }

    /// Checks the payload shape and page numbering.
    pub fn validate(&self) -> ProtocolResult<()> {
        match self.action {
            Action::Create | Action::Update if !self.payload.is_object() => {
                Err(ProtocolError::invalid("record payload must be an object"))
            }
            Action::Delete if !self.payload.is_array() => {
                Err(ProtocolError::invalid("delete payload must be an array"))
            }
            Action::Sync if self.is_sync_done() => Ok(()),
            Action::Sync => match (self.page, self.pages) {
                (Some(page), Some(pages)) if page >= 1 && page <= pages => {
                    if self.payload.is_array() {
                        Ok(())
                    } else {
                        Err(ProtocolError::invalid("sync page payload must be an array"))
                    }
                }
                _ => Err(ProtocolError::invalid("sync page needs 1 <= page <= pages")),
            },
            _ => Ok(()),
        }
    }
}
