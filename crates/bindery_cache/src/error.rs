//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache service could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The key does not exist (or has expired).
    #[error("cache key not found: {key}")]
    NotFound {
        /// The full (prefixed) key.
        key: String,
    },

    /// The key holds a value that is not an integer counter.
    #[error("cache key {key} does not hold a counter")]
    NotACounter {
        /// The full (prefixed) key.
        key: String,
    },

    /// A value could not be encoded or decoded.
    #[error("cache codec error: {0}")]
    Codec(String),
}

impl CacheError {
    /// Returns true if the backend itself is unreachable.
    ///
    /// Callers degrade to the authoritative store on this class of error.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::Unavailable(_))
    }

    /// Returns true if the error is a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(CacheError::Unavailable("down".into()).is_unavailable());
        assert!(!CacheError::Unavailable("down".into()).is_not_found());
        assert!(CacheError::NotFound { key: "k".into() }.is_not_found());
        assert!(!CacheError::Codec("bad".into()).is_unavailable());
    }

    #[test]
    fn error_display() {
        let err = CacheError::NotACounter {
            key: "binding:Product:all:version".into(),
        };
        assert!(err.to_string().contains("binding:Product:all:version"));
    }
}
