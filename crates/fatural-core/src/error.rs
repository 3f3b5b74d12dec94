//! Error types for the bill pipeline.

use thiserror::Error;
use uuid::Uuid;

use crate::models::BillStatus;

/// Result type alias using fatural's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bill not found under the requested tenant
    #[error("Bill not found: {0}")]
    BillNotFound(Uuid),

    /// Storage key does not exist or access was denied
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// Object storage failed for another reason
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Similarity search failed
    #[error("Search error: {0}")]
    Search(String),

    /// A lifecycle transition that the state machine does not allow
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: BillStatus, to: BillStatus },

    /// The stored status changed underneath a conditional update
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// An external call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Queue payload could not be decoded into a job
    #[error("Decode error: {0}")]
    Decode(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether redelivering the same job could produce a different outcome.
    ///
    /// Structural problems (bad payloads, bills that do not exist for the
    /// tenant) never heal on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Decode(_)
                | Error::NotFound(_)
                | Error::BillNotFound(_)
                | Error::InvalidTransition { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_bill_not_found() {
        let id = Uuid::nil();
        let err = Error::BillNotFound(id);
        assert_eq!(err.to_string(), format!("Bill not found: {}", id));
    }

    #[test]
    fn test_error_display_blob_not_found() {
        let err = Error::BlobNotFound("bills/a.jpg".to_string());
        assert_eq!(err.to_string(), "Blob not found: bills/a.jpg");
    }

    #[test]
    fn test_error_display_invalid_transition() {
        let err = Error::InvalidTransition {
            from: BillStatus::Completed,
            to: BillStatus::Processing,
        };
        assert_eq!(err.to_string(), "Invalid transition: completed -> processing");
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout("blob fetch after 30s".to_string());
        assert_eq!(err.to_string(), "Timeout: blob fetch after 30s");
    }

    #[test]
    fn test_error_display_decode() {
        let err = Error::Decode("missing field `bill_id`".to_string());
        assert_eq!(err.to_string(), "Decode error: missing field `bill_id`");
    }

    #[test]
    fn test_structural_errors_are_not_retryable() {
        assert!(!Error::Decode("bad".into()).is_retryable());
        assert!(!Error::BillNotFound(Uuid::nil()).is_retryable());
        assert!(!Error::InvalidTransition {
            from: BillStatus::Failed,
            to: BillStatus::Completed,
        }
        .is_retryable());
    }

    #[test]
    fn test_pipeline_errors_are_retryable() {
        assert!(Error::BlobNotFound("k".into()).is_retryable());
        assert!(Error::Search("index unavailable".into()).is_retryable());
        assert!(Error::Timeout("commit".into()).is_retryable());
        assert!(Error::StateConflict("lost race".into()).is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
