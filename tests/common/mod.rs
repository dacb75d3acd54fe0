//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use proctor_orchestrator::config::OrchestratorConfig;
use proctor_orchestrator::hooks::HookRegistry;
use proctor_orchestrator::job::{Job, JobStatus};
use proctor_orchestrator::model::{
    Allocation, Environment, Range, TestBucket, TestDefinition, TestType,
};
use proctor_orchestrator::service::DefinitionService;
use proctor_orchestrator::specification::{
    AppVersion, ClientSpecification, InMemorySpecificationSource, TestSpecification,
};
use proctor_orchestrator::store::{Credentials, InMemoryStore, StoreSet};

pub const TEST_NAME: &str = "buttons";

pub struct Harness {
    pub working: Arc<InMemoryStore>,
    pub qa: Arc<InMemoryStore>,
    pub production: Arc<InMemoryStore>,
    pub clients: Arc<InMemorySpecificationSource>,
    pub service: DefinitionService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_hooks(HookRegistry::new())
    }

    pub fn with_hooks(hooks: HookRegistry) -> Self {
        let working = Arc::new(InMemoryStore::new(Environment::Working));
        let qa = Arc::new(InMemoryStore::new(Environment::Qa));
        let production = Arc::new(InMemoryStore::new(Environment::Production));
        let clients = Arc::new(InMemorySpecificationSource::new());
        let stores = StoreSet::new(working.clone(), qa.clone(), production.clone());

        let config = OrchestratorConfig {
            verify_executor_threads: 4,
            ..Default::default()
        };
        let service = DefinitionService::builder(stores, clients.clone())
            .with_config(config)
            .with_hooks(hooks)
            .build()
            .unwrap();

        Self {
            working,
            qa,
            production,
            clients,
            service,
        }
    }

    /// Register `app@1.0` in `environment` requiring the standard buckets.
    pub fn register_client(&self, environment: Environment, app: &str) {
        self.clients
            .register(
                environment,
                AppVersion::new(app, "1.0"),
                ClientSpecification::default().with_test(TEST_NAME, client_spec()),
            )
            .unwrap();
    }

    pub fn total_mutations(&self) -> u64 {
        self.working.mutation_count() + self.qa.mutation_count() + self.production.mutation_count()
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("alice", "secret")
}

pub fn client_spec() -> TestSpecification {
    TestSpecification {
        buckets: [("control".to_string(), 0), ("blue".to_string(), 1)]
            .into_iter()
            .collect(),
        ..Default::default()
    }
}

/// Three buckets; `inactive` (2) is declared but gets no traffic.
pub fn definition(control: f64, blue: f64, inactive: f64) -> TestDefinition {
    TestDefinition {
        version: "1".into(),
        test_type: Some(TestType::User),
        salt: "buttons".into(),
        description: "button colours".into(),
        buckets: vec![
            TestBucket::new("control", 0),
            TestBucket::new("blue", 1),
            TestBucket::new("inactive", 2),
        ],
        allocations: vec![Allocation::new(
            None,
            vec![
                Range::new(0, control),
                Range::new(1, blue),
                Range::new(2, inactive),
            ],
        )],
        ..Default::default()
    }
}

pub fn json(definition: &TestDefinition) -> String {
    serde_json::to_string(definition).unwrap()
}

/// Wait for `job` and return its final status.
pub async fn finish(job: &Arc<Job>) -> JobStatus {
    job.wait().await;
    job.status()
}
