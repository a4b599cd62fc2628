//! Subscription handshake messages.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A subscriber's join or disconnect request.
///
/// `version` is kept as raw JSON: clients send numbers, numeric strings or
/// garbage, and anything that is not a whole non-negative number simply
/// fails to match the current version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Last version the subscriber holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    /// True to leave instead of join.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disconnect: bool,
}

impl JoinRequest {
    /// A join claiming `version`, or no version at all.
    pub fn join(version: Option<u64>) -> Self {
        Self {
            version: version.map(Value::from),
            disconnect: false,
        }
    }

    /// A disconnect request.
    pub fn disconnect() -> Self {
        Self {
            version: None,
            disconnect: true,
        }
    }

    /// Returns the claimed version if it is a whole non-negative number.
    ///
    /// Numeric strings are accepted, as are floats with no fractional part.
    pub fn claimed_version(&self) -> Option<u64> {
        match self.version.as_ref()? {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
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

/// Group membership change answering a [`JoinRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinResponse {
    /// Add the connection to these groups.
    #[serde(rename = "joinGroups")]
    Join(Vec<String>),
    /// Remove the connection from these groups.
    #[serde(rename = "leaveGroups")]
    Leave(Vec<String>),
}

impl JoinResponse {
    /// Returns the groups named by the response.
    pub fn groups(&self) -> &[String] {
        match self {
            JoinResponse::Join(groups) | JoinResponse::Leave(groups) => groups,
        }
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
