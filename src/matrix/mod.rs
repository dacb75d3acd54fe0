//! Matrix Verification
//!
//! Validates a candidate definition against every client registered in a
//! target environment. Each client is checked on the blocking pool, bounded
//! by a semaphore, and results are collected as tasks complete.

mod engine;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::TestDefinition;

pub use engine::MatrixVerificationEngine;

/// A test matrix as consumed by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMatrixArtifact {
    pub author: String,
    pub version: String,
    pub description: String,
    pub published: DateTime<Utc>,
    pub tests: BTreeMap<String, TestDefinition>,
}

impl TestMatrixArtifact {
    /// Synthetic matrix holding only `test_name`, or nothing when the
    /// candidate is absent (a deletion check).
    pub fn for_candidate(test_name: &str, candidate: Option<&TestDefinition>) -> Self {
        let tests = candidate
            .map(|d| BTreeMap::from([(test_name.to_string(), d.clone())]))
            .unwrap_or_default();
        Self {
            author: "author".to_string(),
            version: String::new(),
            description: format!("fake matrix for validation of {}", test_name),
            published: Utc::now(),
            tests,
        }
    }
}

/// Verdict of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckMatrixResult {
    pub is_valid: bool,
    /// One message per failing client, in completion order
    pub errors: Vec<String>,
}

impl CheckMatrixResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
