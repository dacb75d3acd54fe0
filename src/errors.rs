//! Crate Error Types
//!
//! Every failure that can end a job is a [`ProctorError`]. Each error maps
//! onto an [`ErrorCategory`] so callers can log and count failures by class
//! without matching on individual variants.

use std::fmt;

use thiserror::Error;

use crate::promotion::{PromotionError, PromotionErrorKind};
use crate::store::StoreError;

/// Boxed error used at extension boundaries (hooks, verifiers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for orchestration operations
pub type ProctorResult<T> = Result<T, ProctorError>;

/// Failure classes, used for log levels and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input: blank credentials, invalid names, incompatible matrix
    Validation,
    /// Concurrent modification detected by a revision check
    Conflict,
    /// The acting principal lacks permission in the backing store
    AccessControl,
    /// An extension hook reported errors
    Hook,
    /// Anything else
    Unexpected,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::AccessControl => "access_control",
            Self::Hook => "hook",
            Self::Unexpected => "unexpected",
        }
    }

    /// Whether this class indicates a user mistake rather than a system fault.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation | Self::AccessControl | Self::Hook)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestration error
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("{0}")]
    Validation(String),

    #[error("Test Promotion not compatible, errors: {}", .errors.join("\n"))]
    IncompatibleMatrix { errors: Vec<String> },

    #[error("Test has been updated since {expected} currently at {actual}")]
    StaleRevision { expected: String, actual: String },

    #[error("{hook} failed with the following errors: [{}]", .errors.join(", "))]
    Hook { hook: String, errors: Vec<String> },

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error("{message}")]
    Unexpected {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ProctorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error with context.
    pub fn wrap(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Unexpected {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Failure class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::IncompatibleMatrix { .. } | Self::NotFound(_) => {
                ErrorCategory::Validation
            }
            Self::StaleRevision { .. } => ErrorCategory::Conflict,
            Self::Hook { .. } => ErrorCategory::Hook,
            Self::Store(e) => {
                if e.is_conflict() {
                    ErrorCategory::Conflict
                } else if e.is_access_denied() {
                    ErrorCategory::AccessControl
                } else {
                    ErrorCategory::Unexpected
                }
            }
            Self::Promotion(e) => match e.kind {
                PromotionErrorKind::ForbiddenTransition | PromotionErrorKind::SourceMissing => {
                    ErrorCategory::Validation
                }
                PromotionErrorKind::DestinationMoved => ErrorCategory::Conflict,
            },
            Self::Unexpected { .. } => ErrorCategory::Unexpected,
        }
    }
}
