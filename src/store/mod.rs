//! Revisioned Definition Stores
//!
//! Each environment is backed by an independent store with its own history.
//! This module defines the store contract the orchestrator consumes, plus an
//! in-memory implementation, the environment-version cache and the per-test
//! read locks that serialize history reads.
//!
//! Mutations are optimistic: `update` and `delete` name the revision they
//! expect to replace and fail with [`StoreError::Conflict`] when it is stale.

mod errors;
mod locks;
mod memory;
mod versions;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{Environment, Revision, TestDefinition};

pub use errors::{StoreError, StoreResult};
pub use locks::TestReadLocks;
pub use memory::InMemoryStore;
pub use versions::{lookup_definition, EnvironmentVersions, StoreVersionCache};

/// Free-form commit metadata passed through to the store.
pub type Metadata = BTreeMap<String, String>;

/// Principal performing a store mutation.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// True when either field is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.username.trim().is_empty() || self.password.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Contract of one environment's revisioned store.
pub trait DefinitionStore: Send + Sync {
    /// Current definition of a test, `None` if it does not exist.
    fn current_definition(&self, test_name: &str) -> StoreResult<Option<TestDefinition>>;

    /// Definition as of `revision`, `None` if unknown at that revision.
    fn definition_at(&self, test_name: &str, revision: &str)
        -> StoreResult<Option<TestDefinition>>;

    /// History newest first, starting at `from_revision` when given.
    fn history(
        &self,
        test_name: &str,
        from_revision: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<Revision>>;

    /// Add a new test; returns the new revision id.
    fn add(
        &self,
        credentials: &Credentials,
        test_name: &str,
        definition: &TestDefinition,
        metadata: &Metadata,
        comment: &str,
    ) -> StoreResult<String>;

    /// Replace a test at `previous_revision`; returns the new revision id.
    fn update(
        &self,
        credentials: &Credentials,
        previous_revision: &str,
        test_name: &str,
        definition: &TestDefinition,
        metadata: &Metadata,
        comment: &str,
    ) -> StoreResult<String>;

    /// Delete a test at `revision`.
    fn delete(
        &self,
        credentials: &Credentials,
        revision: &str,
        test_name: &str,
        definition: &TestDefinition,
        comment: &str,
    ) -> StoreResult<()>;

    /// Latest history entry for a test.
    fn latest_revision(&self, test_name: &str) -> StoreResult<Option<Revision>> {
        Ok(self.history(test_name, None, 1)?.into_iter().next())
    }
}

/// The three environment stores.
#[derive(Clone)]
pub struct StoreSet {
    working: Arc<dyn DefinitionStore>,
    qa: Arc<dyn DefinitionStore>,
    production: Arc<dyn DefinitionStore>,
}

impl StoreSet {
    pub fn new(
        working: Arc<dyn DefinitionStore>,
        qa: Arc<dyn DefinitionStore>,
        production: Arc<dyn DefinitionStore>,
    ) -> Self {
        Self {
            working,
            qa,
            production,
        }
    }

    /// Store backing `environment`.
    pub fn get(&self, environment: Environment) -> &Arc<dyn DefinitionStore> {
        match environment {
            Environment::Working => &self.working,
            Environment::Qa => &self.qa,
            Environment::Production => &self.production,
        }
    }
}

impl fmt::Debug for StoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_credentials() {
        assert!(Credentials::new("", "secret").is_blank());
        assert!(Credentials::new("alice", "   ").is_blank());
        assert!(!Credentials::new("alice", "secret").is_blank());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_store_set_routing() {
        let working = Arc::new(InMemoryStore::new(Environment::Working));
        let qa = Arc::new(InMemoryStore::new(Environment::Qa));
        let production = Arc::new(InMemoryStore::new(Environment::Production));
        let stores = StoreSet::new(working.clone(), qa, production);

        let definition = TestDefinition::default();
        stores
            .get(Environment::Working)
            .add(
                &Credentials::new("alice", "pw"),
                "buttons",
                &definition,
                &Metadata::new(),
                "create",
            )
            .unwrap();

        assert!(working.current_definition("buttons").unwrap().is_some());
        assert!(stores
            .get(Environment::Qa)
            .current_definition("buttons")
            .unwrap()
            .is_none());
    }
}
