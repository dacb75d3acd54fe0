//! Environment version lookup
//!
//! Resolves which revision of a test is current in each environment. The
//! cache is filled lazily and patched after the orchestrator writes, so a
//! test's entry never lags behind a mutation made through this process.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::model::{Environment, EnvironmentVersion, Revision, TestDefinition, UNKNOWN_REVISION};

use super::errors::{StoreError, StoreResult};
use super::StoreSet;

/// Source of per-environment current revisions.
pub trait EnvironmentVersions: Send + Sync {
    /// Current revision of `test_name` in every environment.
    fn version_of(&self, test_name: &str) -> StoreResult<EnvironmentVersion>;

    /// Re-read only the working environment's revision.
    fn refresh_working_version(&self, test_name: &str) -> StoreResult<()>;

    /// Drop anything cached for `test_name`.
    fn invalidate(&self, test_name: &str) -> StoreResult<()>;
}

/// Lazily filled version cache reading from a [`StoreSet`].
#[derive(Debug)]
pub struct StoreVersionCache {
    stores: StoreSet,
    cache: RwLock<HashMap<String, EnvironmentVersion>>,
}

impl StoreVersionCache {
    pub fn new(stores: StoreSet) -> Self {
        Self {
            stores,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Revision current in `environment`, `None` when the test is absent.
    fn read_revision(&self, test_name: &str, environment: Environment) -> StoreResult<Option<Revision>> {
        let store = self.stores.get(environment);
        if store.current_definition(test_name)?.is_none() {
            return Ok(None);
        }
        store.latest_revision(test_name)
    }

    fn load(&self, test_name: &str) -> StoreResult<EnvironmentVersion> {
        let mut version = EnvironmentVersion::unknown(test_name);
        for environment in Environment::ALL {
            version.set(environment, self.read_revision(test_name, environment)?);
        }
        Ok(version)
    }
}

impl EnvironmentVersions for StoreVersionCache {
    fn version_of(&self, test_name: &str) -> StoreResult<EnvironmentVersion> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| StoreError::backend("Lock poisoned"))?;
            if let Some(version) = cache.get(test_name) {
                return Ok(version.clone());
            }
        }

        let version = self.load(test_name)?;
        self.cache
            .write()
            .map_err(|_| StoreError::backend("Lock poisoned"))?
            .insert(test_name.to_string(), version.clone());
        Ok(version)
    }

    fn refresh_working_version(&self, test_name: &str) -> StoreResult<()> {
        let working = self.read_revision(test_name, Environment::Working)?;
        let mut cache = self
            .cache
            .write()
            .map_err(|_| StoreError::backend("Lock poisoned"))?;
        match cache.get_mut(test_name) {
            Some(version) => version.set(Environment::Working, working),
            None => {
                drop(cache);
                let version = self.load(test_name)?;
                self.cache
                    .write()
                    .map_err(|_| StoreError::backend("Lock poisoned"))?
                    .insert(test_name.to_string(), version);
            }
        }
        Ok(())
    }

    fn invalidate(&self, test_name: &str) -> StoreResult<()> {
        self.cache
            .write()
            .map_err(|_| StoreError::backend("Lock poisoned"))?
            .remove(test_name);
        Ok(())
    }
}

/// Definition of `test_name` in `environment` at `revision`.
///
/// The unknown revision yields `None`. An empty revision, or the revision
/// currently live in the environment, reads the current definition.
pub fn lookup_definition(
    stores: &StoreSet,
    versions: &dyn EnvironmentVersions,
    environment: Environment,
    test_name: &str,
    revision: &str,
) -> StoreResult<Option<TestDefinition>> {
    if revision == UNKNOWN_REVISION {
        info!(test = %test_name, "ignoring unknown revision");
        return Ok(None);
    }
    let store = stores.get(environment);
    let version = versions.version_of(test_name)?;
    let current = version.revision(environment);
    if revision.is_empty() || (current != UNKNOWN_REVISION && current == revision) {
        store.current_definition(test_name)
    } else {
        store.definition_at(test_name, revision)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::TestDefinition;
    use crate::store::{Credentials, DefinitionStore, InMemoryStore, Metadata};

    fn setup() -> (Arc<InMemoryStore>, Arc<InMemoryStore>, StoreVersionCache) {
        let working = Arc::new(InMemoryStore::new(Environment::Working));
        let qa = Arc::new(InMemoryStore::new(Environment::Qa));
        let production = Arc::new(InMemoryStore::new(Environment::Production));
        let cache = StoreVersionCache::new(StoreSet::new(working.clone(), qa.clone(), production));
        (working, qa, cache)
    }

    #[test]
    fn test_lookup_definition() {
        let working = Arc::new(InMemoryStore::new(Environment::Working));
        let stores = StoreSet::new(
            working.clone(),
            Arc::new(InMemoryStore::new(Environment::Qa)),
            Arc::new(InMemoryStore::new(Environment::Production)),
        );
        let cache = StoreVersionCache::new(stores.clone());
        let first = TestDefinition {
            salt: "one".into(),
            ..Default::default()
        };
        let r1 = working.seed("buttons", first).unwrap();
        let second = TestDefinition {
            salt: "two".into(),
            ..Default::default()
        };
        let r2 = working
            .update(&Credentials::new("alice", "pw"), &r1, "buttons", &second, &Metadata::new(), "edit")
            .unwrap();

        let lookup = |rev: &str| {
            lookup_definition(&stores, &cache, Environment::Working, "buttons", rev)
                .unwrap()
                .map(|d| d.salt)
        };
        assert_eq!(lookup(""), Some("two".to_string()));
        assert_eq!(lookup(&r2), Some("two".to_string()));
        assert_eq!(lookup(&r1), Some("one".to_string()));
        assert_eq!(lookup(UNKNOWN_REVISION), None);
    }

    #[test]
    fn test_unknown_test() {
        let (_, _, cache) = setup();
        let version = cache.version_of("missing").unwrap();
        assert_eq!(version, EnvironmentVersion::unknown("missing"));
    }

    #[test]
    fn test_reads_each_environment() {
        let (working, qa, cache) = setup();
        let t = working.seed("buttons", TestDefinition::default()).unwrap();
        let q = qa.seed("buttons", TestDefinition::default()).unwrap();

        let version = cache.version_of("buttons").unwrap();
        assert_eq!(version.revision(Environment::Working), t);
        assert_eq!(version.revision(Environment::Qa), q);
        assert!(!version.is_known(Environment::Production));
    }

    #[test]
    fn test_refresh_working_only() {
        let (working, qa, cache) = setup();
        let t1 = working.seed("buttons", TestDefinition::default()).unwrap();
        cache.version_of("buttons").unwrap();

        let t2 = working
            .update(
                &Credentials::new("alice", "pw"),
                &t1,
                "buttons",
                &TestDefinition::default(),
                &Metadata::new(),
                "edit",
            )
            .unwrap();
        qa.seed("buttons", TestDefinition::default()).unwrap();

        cache.refresh_working_version("buttons").unwrap();
        let version = cache.version_of("buttons").unwrap();
        assert_eq!(version.revision(Environment::Working), t2);
        // qa stays as cached until invalidated
        assert!(!version.is_known(Environment::Qa));

        cache.invalidate("buttons").unwrap();
        assert!(cache.version_of("buttons").unwrap().is_known(Environment::Qa));
    }
}
