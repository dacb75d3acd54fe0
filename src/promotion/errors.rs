//! Promotion Error Types

use std::fmt;

use crate::model::Environment;

/// Promotion error type
#[derive(Debug, Clone)]
pub struct PromotionError {
    /// Error kind
    pub kind: PromotionErrorKind,
    /// Error message
    pub message: String,
}

/// Promotion error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionErrorKind {
    /// The source/destination pair is not a legal transition
    ForbiddenTransition,

    /// The definition to promote does not exist at the source revision
    SourceMissing,

    /// The destination no longer matches the expected revision
    DestinationMoved,
}

impl PromotionError {
    /// Create a new promotion error.
    pub fn new(kind: PromotionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a forbidden transition error.
    pub fn forbidden_transition(source: Environment, destination: Environment) -> Self {
        Self::new(
            PromotionErrorKind::ForbiddenTransition,
            format!(
                "Invalid combination of source and destination: source={} dest={}",
                source, destination
            ),
        )
    }

    /// Create a missing source definition error.
    pub fn source_missing(test_name: &str, source: Environment, revision: &str) -> Self {
        Self::new(
            PromotionErrorKind::SourceMissing,
            format!(
                "could not find {} on {} with revision {}",
                test_name, source, revision
            ),
        )
    }

    /// Create a destination moved error.
    pub fn destination_moved(
        test_name: &str,
        destination: Environment,
        expected: &str,
        actual: &str,
    ) -> Self {
        Self::new(
            PromotionErrorKind::DestinationMoved,
            format!(
                "{} on {} is at revision {}, expected {}",
                test_name, destination, actual, expected
            ),
        )
    }
}

impl fmt::Display for PromotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PromotionError {}

/// Result type for promotion operations
pub type PromotionResult<T> = Result<T, PromotionError>;
