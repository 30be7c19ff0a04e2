//! Error types for the sync layer

use thiserror::Error;

/// Sync layer error
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend rejected the presented credential (401)
    #[error("Session expired: credential rejected by the server")]
    CredentialExpired,

    /// Transport-level failure (connectivity, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Server returned a non-success status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// A success body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No base URL could be resolved in a production build
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persistent key-value store failure
    #[error("Store error: {0}")]
    Store(String),
}

impl SyncError {
    /// Transient failure worth retrying by hand; local state is untouched.
    ///
    /// A missing gated endpoint (405) never reaches here: the sync client
    /// absorbs it into the gate and the association state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::CredentialExpired => Some(401),
            SyncError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Configuration(err.to_string())
    }
}

/// Result type for sync layer operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(SyncError::Network("down".into()).is_recoverable());
        assert!(!SyncError::CredentialExpired.is_recoverable());
        assert!(!SyncError::Server { status: 500, message: "boom".into() }.is_recoverable());
        assert!(!SyncError::Configuration("none".into()).is_recoverable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SyncError::CredentialExpired.status(), Some(401));
        assert_eq!(SyncError::Server { status: 503, message: "down".into() }.status(), Some(503));
        assert_eq!(SyncError::Network("x".into()).status(), None);
    }
}
