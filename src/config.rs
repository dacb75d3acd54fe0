//! Orchestrator configuration
//!
//! Loaded from a JSON file. Every field is optional and falls back to its
//! default.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::DEFAULT_RETAINED_JOBS;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrently running client verifications
    #[serde(default = "default_verify_executor_threads")]
    pub verify_executor_threads: usize,

    /// Completed jobs kept for lookup before the oldest are evicted
    #[serde(default = "default_retained_jobs")]
    pub retained_jobs: usize,

    /// Prefix of result links, followed by the test name
    #[serde(default = "default_definition_url_base")]
    pub definition_url_base: String,
}

fn default_verify_executor_threads() -> usize {
    10
}
fn default_retained_jobs() -> usize {
    DEFAULT_RETAINED_JOBS
}
fn default_definition_url_base() -> String {
    "/proctor/definition/".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            verify_executor_threads: default_verify_executor_threads(),
            retained_jobs: default_retained_jobs(),
            definition_url_base: default_definition_url_base(),
        }
    }
}

impl OrchestratorConfig {
    /// Load and validate configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: OrchestratorConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_executor_threads == 0 {
            return Err(ConfigError::Invalid(
                "verify_executor_threads must be > 0".into(),
            ));
        }
        if self.retained_jobs == 0 {
            return Err(ConfigError::Invalid("retained_jobs must be > 0".into()));
        }
        if self.definition_url_base.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "definition_url_base must not be empty".into(),
            ));
        }
        Ok(())
    }
}
