//! Error types for Bindery core.

use crate::types::RecordId;
use bindery_cache::CacheError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Bindery core operations.
///
/// Expected races (an id that is not tracked, a listener that was never
/// added, a binding registered twice) are not errors; those operations
/// report "nothing happened" through their return values instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cache error that could not be degraded around.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The authoritative record store could not serve the request.
    #[error("record store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A record addressed by id does not exist.
    #[error("record not found: {record_type} {id}")]
    RecordNotFound {
        /// The record type searched.
        record_type: String,
        /// The id that was not found.
        id: RecordId,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Returns true if the record store was unreachable.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable { .. })
    }
}
