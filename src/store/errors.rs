//! Store Error Types

use thiserror::Error;

use crate::errors::BoxError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Revisioned store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A mutation named a revision that is no longer the latest.
    #[error("Unable to update '{test_name}': expected revision {expected} but store is at {actual}")]
    Conflict {
        test_name: String,
        expected: String,
        actual: String,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Test not found: {0}")]
    NotFound(String),

    #[error("Store failure: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl StoreError {
    pub fn conflict(
        test_name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            test_name: test_name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn not_found(test_name: impl Into<String>) -> Self {
        Self::NotFound(test_name.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend {
            message: msg.into(),
            source: None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}
