//! Revisions and per-environment version tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::TestDefinition;
use super::environment::Environment;

/// Sentinel revision for a test that does not exist in an environment.
pub const UNKNOWN_REVISION: &str = "-1";

/// First seven characters of a revision id, as shown in job logs.
pub fn short_revision(revision: &str) -> &str {
    match revision.char_indices().nth(7) {
        Some((idx, _)) => &revision[..idx],
        None => revision,
    }
}

/// One entry of a store's history for a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub revision: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub message: String,
}

impl Revision {
    pub fn new(
        revision: impl Into<String>,
        author: impl Into<String>,
        date: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            revision: revision.into(),
            author: author.into(),
            date,
            message: message.into(),
        }
    }

    /// Placeholder used where no revision is known.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_REVISION, "", DateTime::<Utc>::default(), "")
    }
}

/// History entry optionally paired with the definition at that revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionDefinition {
    pub revision: Revision,
    pub definition: Option<TestDefinition>,
}

/// Current revision of one test in each environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVersion {
    pub test_name: String,
    pub working: Option<Revision>,
    pub qa: Option<Revision>,
    pub production: Option<Revision>,
}

impl EnvironmentVersion {
    /// A version where the test is unknown everywhere.
    pub fn unknown(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            working: None,
            qa: None,
            production: None,
        }
    }

    /// Full revision for `environment`, if the test exists there.
    pub fn full_revision(&self, environment: Environment) -> Option<&Revision> {
        match environment {
            Environment::Working => self.working.as_ref(),
            Environment::Qa => self.qa.as_ref(),
            Environment::Production => self.production.as_ref(),
        }
    }

    /// Revision id for `environment`, or [`UNKNOWN_REVISION`].
    pub fn revision(&self, environment: Environment) -> &str {
        self.full_revision(environment)
            .map(|r| r.revision.as_str())
            .unwrap_or(UNKNOWN_REVISION)
    }

    pub fn is_known(&self, environment: Environment) -> bool {
        self.revision(environment) != UNKNOWN_REVISION
    }

    pub fn set(&mut self, environment: Environment, revision: Option<Revision>) {
        match environment {
            Environment::Working => self.working = revision,
            Environment::Qa => self.qa = revision,
            Environment::Production => self.production = revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_revision() {
        assert_eq!(short_revision("0123456789abcdef"), "0123456");
        assert_eq!(short_revision("r1"), "r1");
        assert_eq!(short_revision(""), "");
    }

    #[test]
    fn test_unknown_everywhere() {
        let version = EnvironmentVersion::unknown("buttons");
        for env in Environment::ALL {
            assert_eq!(version.revision(env), UNKNOWN_REVISION);
            assert!(!version.is_known(env));
        }
    }

    #[test]
    fn test_set_revision() {
        let mut version = EnvironmentVersion::unknown("buttons");
        version.set(
            Environment::Qa,
            Some(Revision::new("r9", "alice", Utc::now(), "promote")),
        );
        assert_eq!(version.revision(Environment::Qa), "r9");
        assert!(version.is_known(Environment::Qa));
        assert!(!version.is_known(Environment::Production));
    }
}
