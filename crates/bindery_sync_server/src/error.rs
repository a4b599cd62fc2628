//! Error types for the sync server.

use bindery_core::CoreError;
use bindery_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No endpoint serves the requested event.
    #[error("unknown binding: {0}")]
    UnknownBinding(String),

    /// Binding or store error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Message encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Delivery failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnknownBinding(_)
                | ServerError::Protocol(_)
        )
    }

    /// Returns true if the server or its dependencies were at fault.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::Core(_) | ServerError::Transport(_) | ServerError::Internal(_)
        )
    }
}

/// Errors reported by a [`Transport`](crate::Transport).
///
/// Delivery is not retried here; the caller decides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection or group exists under this name.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    /// The transport could not deliver.
    #[error("transport unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
        /// Whether the delivery can be retried.
        retryable: bool,
    },
}

impl TransportError {
    /// Creates a retryable unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns true if retrying the delivery may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Unavailable { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::UnknownBinding("products".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());

        let err: ServerError = CoreError::store_unavailable("down").into();
        assert!(err.is_server_error());
    }

    #[test]
    fn transport_retryability() {
        assert!(TransportError::unavailable("socket closed").is_retryable());
        assert!(!TransportError::UnknownRecipient("ch-1".into()).is_retryable());
        assert!(!TransportError::Unavailable {
            message: "gone".into(),
            retryable: false
        }
        .is_retryable());
    }
}
