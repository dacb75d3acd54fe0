//! Request and response types of the definition service.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Environment, EnvironmentVersion, RevisionDefinition, TestDefinition};
use crate::specification::AppVersion;
use crate::store::{Credentials, Metadata};

/// Create or edit a test on trunk.
///
/// An empty `previous_revision` means create.
#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    pub test_name: String,
    /// Definition as submitted, parsed inside the job
    pub definition_json: String,
    pub previous_revision: String,
    pub comment: String,
    pub credentials: Credentials,
    pub autopromote: bool,
    pub metadata: Metadata,
}

impl EditRequest {
    pub fn is_create(&self) -> bool {
        self.previous_revision.is_empty()
    }
}

/// Delete a test from one environment at its current revision.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub test_name: String,
    pub source: Environment,
    pub src_revision: String,
    pub comment: String,
    pub credentials: Credentials,
    pub metadata: Metadata,
}

/// Manually promote a test.
#[derive(Debug, Clone)]
pub struct PromoteRequest {
    pub test_name: String,
    pub source: Environment,
    pub src_revision: String,
    pub destination: Environment,
    pub dest_revision: String,
    pub credentials: Credentials,
    pub metadata: Metadata,
}

/// Outcome of a dry-run promotion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum VerifyOutcome {
    SameEnvironment,
    Missing { message: String },
    Compatible,
    Incompatible { errors: Vec<String> },
}

impl VerifyOutcome {
    /// Line shown to the user.
    pub fn message(&self) -> String {
        match self {
            Self::SameEnvironment => "source == destination".to_string(),
            Self::Missing { message } => message.clone(),
            Self::Compatible => "check success".to_string(),
            Self::Incompatible { errors } => format!("failed: {}", errors.join("\n")),
        }
    }

    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible)
    }
}

/// Everything shown on a test's detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionDetails {
    pub environment: Environment,
    pub test_name: String,
    pub definition: Option<TestDefinition>,
    pub version: EnvironmentVersion,
    pub history: Vec<RevisionDefinition>,
    pub active_clients: BTreeMap<Environment, BTreeSet<AppVersion>>,
    /// Set when the test only exists in other environments
    pub error_message: Option<String>,
}
