//! Client Specifications
//!
//! Downstream applications register, per environment, which tests they
//! require and the bucket shape they expect. A definition may only move or
//! change while it stays compatible with every registered client.

mod verifier;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::errors::{ProctorError, ProctorResult};
use crate::model::{Environment, TestDefinition};

pub use verifier::{check_internal_consistency, ClientVerifier, LoadResult, SpecificationVerifier};

/// Fallback value used by generated specifications.
pub const DEFAULT_FALLBACK_VALUE: i32 = -1;

/// A client application at a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppVersion {
    pub app: String,
    pub version: String,
}

impl AppVersion {
    pub fn new(app: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.app, self.version)
    }
}

/// Required payload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSpecification {
    /// One of the payload type names, e.g. `stringValue`
    #[serde(rename = "type")]
    pub payload_type: String,
}

/// What a client expects of one test.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpecification {
    /// Bucket name to value
    #[serde(default)]
    pub buckets: BTreeMap<String, i32>,
    #[serde(default = "default_fallback_value")]
    pub fallback_value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadSpecification>,
}

fn default_fallback_value() -> i32 {
    DEFAULT_FALLBACK_VALUE
}

impl TestSpecification {
    /// Derive the specification a client would declare for `definition`.
    ///
    /// The payload type is taken from the first bucket carrying a payload;
    /// buckets must agree on it.
    pub fn generate(definition: &TestDefinition) -> ProctorResult<Self> {
        let mut payload_type: Option<&'static str> = None;
        for bucket in &definition.buckets {
            let Some(payload) = &bucket.payload else {
                continue;
            };
            match payload_type {
                None => payload_type = Some(payload.payload_type()),
                Some(t) if t != payload.payload_type() => {
                    return Err(ProctorError::validation(format!(
                        "Payloads must all be the same type, found {} and {}",
                        t,
                        payload.payload_type()
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            buckets: definition
                .buckets
                .iter()
                .map(|b| (b.name.clone(), b.value))
                .collect(),
            fallback_value: DEFAULT_FALLBACK_VALUE,
            payload: payload_type.map(|t| PayloadSpecification {
                payload_type: t.to_string(),
            }),
        })
    }

    pub fn knows_value(&self, value: i32) -> bool {
        self.buckets.values().any(|v| *v == value)
    }
}

/// Everything one client version requires.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientSpecification {
    /// Required tests by name
    #[serde(default)]
    pub tests: BTreeMap<String, TestSpecification>,
}

impl ClientSpecification {
    pub fn with_test(mut self, name: impl Into<String>, spec: TestSpecification) -> Self {
        self.tests.insert(name.into(), spec);
        self
    }

    pub fn requires(&self, test_name: &str) -> bool {
        self.tests.contains_key(test_name)
    }
}

/// Registry of client specifications per environment.
pub trait SpecificationSource: Send + Sync {
    /// Every registered client for `environment`.
    fn specifications_for(
        &self,
        environment: Environment,
    ) -> ProctorResult<BTreeMap<AppVersion, ClientSpecification>>;

    /// Clients in `environment` currently requiring `test_name`.
    fn active_clients(
        &self,
        environment: Environment,
        test_name: &str,
    ) -> ProctorResult<BTreeSet<AppVersion>>;
}

type Registry = BTreeMap<Environment, BTreeMap<AppVersion, ClientSpecification>>;

/// Specification registry held in memory.
#[derive(Debug, Default)]
pub struct InMemorySpecificationSource {
    clients: RwLock<Registry>,
}

impl InMemorySpecificationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a client version in `environment`.
    pub fn register(
        &self,
        environment: Environment,
        app_version: AppVersion,
        specification: ClientSpecification,
    ) -> ProctorResult<()> {
        self.clients
            .write()
            .map_err(|_| ProctorError::unexpected("Lock poisoned"))?
            .entry(environment)
            .or_default()
            .insert(app_version, specification);
        Ok(())
    }

    pub fn unregister(&self, environment: Environment, app_version: &AppVersion) -> ProctorResult<bool> {
        let mut clients = self
            .clients
            .write()
            .map_err(|_| ProctorError::unexpected("Lock poisoned"))?;
        Ok(clients
            .get_mut(&environment)
            .map(|m| m.remove(app_version).is_some())
            .unwrap_or(false))
    }

    /// Build a registry from `(environment, app, specification)` entries.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Environment, AppVersion, ClientSpecification)>,
    ) -> ProctorResult<Self> {
        let source = Self::new();
        for (environment, app_version, specification) in entries {
            source.register(environment, app_version, specification)?;
        }
        Ok(source)
    }
}

impl SpecificationSource for InMemorySpecificationSource {
    fn specifications_for(
        &self,
        environment: Environment,
    ) -> ProctorResult<BTreeMap<AppVersion, ClientSpecification>> {
        let clients = self
            .clients
            .read()
            .map_err(|_| ProctorError::unexpected("Lock poisoned"))?;
        Ok(clients.get(&environment).cloned().unwrap_or_default())
    }

    fn active_clients(
        &self,
        environment: Environment,
        test_name: &str,
    ) -> ProctorResult<BTreeSet<AppVersion>> {
        Ok(self
            .specifications_for(environment)?
            .into_iter()
            .filter(|(_, spec)| spec.requires(test_name))
            .map(|(app, _)| app)
            .collect())
    }
}
