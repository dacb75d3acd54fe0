//! In-memory revisioned store
//!
//! Keeps the full history of every test. Revision ids are unique per store
//! and prefixed with the environment's initial (`t4`, `q2`, `p1`).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use crate::model::{Environment, Revision, TestDefinition, UNKNOWN_REVISION};

use super::errors::{StoreError, StoreResult};
use super::{Credentials, DefinitionStore, Metadata};

/// One committed change; `definition` is `None` for deletions.
#[derive(Debug, Clone)]
struct Entry {
    revision: Revision,
    definition: Option<TestDefinition>,
}

/// In-memory store for one environment.
#[derive(Debug)]
pub struct InMemoryStore {
    environment: Environment,

    /// Histories by test name, oldest first
    tests: RwLock<HashMap<String, Vec<Entry>>>,

    /// Usernames refused on mutation
    denied_users: RwLock<HashSet<String>>,

    next_revision: AtomicU64,

    mutations: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store for `environment`.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            tests: RwLock::new(HashMap::new()),
            denied_users: RwLock::new(HashSet::new()),
            next_revision: AtomicU64::new(1),
            mutations: AtomicU64::new(0),
        }
    }

    /// Refuse every future mutation by `username`.
    pub fn deny_user(&self, username: impl Into<String>) -> StoreResult<()> {
        self.denied_users
            .write()
            .map_err(|_| StoreError::backend("Lock poisoned"))?
            .insert(username.into());
        Ok(())
    }

    /// Number of successful mutations since creation.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Seed a definition without credentials; returns the revision id.
    pub fn seed(&self, test_name: &str, definition: TestDefinition) -> StoreResult<String> {
        self.commit(test_name, Some(definition), "seed", "seed")
    }

    fn next_revision_id(&self) -> String {
        let n = self.next_revision.fetch_add(1, Ordering::SeqCst);
        let prefix = match self.environment {
            Environment::Working => 't',
            Environment::Qa => 'q',
            Environment::Production => 'p',
        };
        format!("{}{}", prefix, n)
    }

    fn check_access(&self, credentials: &Credentials) -> StoreResult<()> {
        let denied = self
            .denied_users
            .read()
            .map_err(|_| StoreError::backend("Lock poisoned"))?;
        if denied.contains(&credentials.username) {
            return Err(StoreError::access_denied(format!(
                "{} does not have write access to {}",
                credentials.username, self.environment
            )));
        }
        Ok(())
    }

    fn commit(
        &self,
        test_name: &str,
        definition: Option<TestDefinition>,
        author: &str,
        comment: &str,
    ) -> StoreResult<String> {
        let id = self.next_revision_id();
        let entry = Entry {
            revision: Revision::new(id.clone(), author, Utc::now(), comment),
            definition,
        };
        self.tests
            .write()
            .map_err(|_| StoreError::backend("Lock poisoned"))?
            .entry(test_name.to_string())
            .or_default()
            .push(entry);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    /// Latest revision id and whether the test currently exists.
    fn head(&self, test_name: &str) -> StoreResult<(String, bool)> {
        let tests = self
            .tests
            .read()
            .map_err(|_| StoreError::backend("Lock poisoned"))?;
        Ok(match tests.get(test_name).and_then(|h| h.last()) {
            Some(entry) => (entry.revision.revision.clone(), entry.definition.is_some()),
            None => (UNKNOWN_REVISION.to_string(), false),
        })
    }
}

impl DefinitionStore for InMemoryStore {
    fn current_definition(&self, test_name: &str) -> StoreResult<Option<TestDefinition>> {
        let tests = self
            .tests
            .read()
            .map_err(|_| StoreError::backend("Lock poisoned"))?;
        Ok(tests
            .get(test_name)
            .and_then(|h| h.last())
            .and_then(|e| e.definition.clone()))
    }

    fn definition_at(
        &self,
        test_name: &str,
        revision: &str,
    ) -> StoreResult<Option<TestDefinition>> {
        let tests = self
            .tests
            .read()
            .map_err(|_| StoreError::backend("Lock poisoned"))?;
        Ok(tests
            .get(test_name)
            .and_then(|h| h.iter().find(|e| e.revision.revision == revision))
            .and_then(|e| e.definition.clone()))
    }

    fn history(
        &self,
        test_name: &str,
        from_revision: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<Revision>> {
        let tests = self
            .tests
            .read()
            .map_err(|_| StoreError::backend("Lock poisoned"))?;
        let Some(history) = tests.get(test_name) else {
            return Ok(Vec::new());
        };

        let newest_first = history.iter().rev();
        let revisions: Vec<Revision> = match from_revision {
            Some(from) => newest_first
                .skip_while(|e| e.revision.revision != from)
                .take(limit)
                .map(|e| e.revision.clone())
                .collect(),
            None => newest_first.take(limit).map(|e| e.revision.clone()).collect(),
        };
        Ok(revisions)
    }

    fn add(
        &self,
        credentials: &Credentials,
        test_name: &str,
        definition: &TestDefinition,
        _metadata: &Metadata,
        comment: &str,
    ) -> StoreResult<String> {
        self.check_access(credentials)?;
        let (head, exists) = self.head(test_name)?;
        if exists {
            return Err(StoreError::conflict(test_name, UNKNOWN_REVISION, head));
        }
        self.commit(
            test_name,
            Some(definition.clone()),
            &credentials.username,
            comment,
        )
    }

    fn update(
        &self,
        credentials: &Credentials,
        previous_revision: &str,
        test_name: &str,
        definition: &TestDefinition,
        _metadata: &Metadata,
        comment: &str,
    ) -> StoreResult<String> {
        self.check_access(credentials)?;
        let (head, exists) = self.head(test_name)?;
        if !exists {
            return Err(StoreError::not_found(test_name));
        }
        if head != previous_revision {
            return Err(StoreError::conflict(test_name, previous_revision, head));
        }
        self.commit(
            test_name,
            Some(definition.clone()),
            &credentials.username,
            comment,
        )
    }

    fn delete(
        &self,
        credentials: &Credentials,
        revision: &str,
        test_name: &str,
        _definition: &TestDefinition,
        comment: &str,
    ) -> StoreResult<()> {
        self.check_access(credentials)?;
        let (head, exists) = self.head(test_name)?;
        if !exists {
            return Err(StoreError::not_found(test_name));
        }
        if head != revision {
            return Err(StoreError::conflict(test_name, revision, head));
        }
        self.commit(test_name, None, &credentials.username, comment)?;
        Ok(())
    }
}
