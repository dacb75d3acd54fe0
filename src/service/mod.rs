//! Definition Service
//!
//! Caller-facing layer over the stores, the verification engine and the
//! promotion state machine. Every mutation is submitted as a [`Job`] and
//! returns immediately; reads run inline under the per-test read lock.

mod comments;
mod delete;
mod edit;
mod requests;
mod validation;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::OrchestratorConfig;
use crate::errors::{ProctorError, ProctorResult};
use crate::hooks::HookRegistry;
use crate::job::{Job, JobHooks, JobManager, JobType};
use crate::matrix::{CheckMatrixResult, MatrixVerificationEngine};
use crate::model::{short_revision, Environment, RevisionDefinition, TestDefinition};
use crate::promotion::{
    AutopromoteCascade, PromotionRequest, PromotionStateMachine, Promoter, StorePromoter,
};
use crate::specification::{
    ClientVerifier, SpecificationSource, SpecificationVerifier, TestSpecification,
};
use crate::store::{
    lookup_definition, EnvironmentVersions, StoreSet, StoreVersionCache, TestReadLocks,
};

pub use comments::{default_comment, format_full_comment, ChangeKind, CommentFormatter};
pub use requests::{DefinitionDetails, DeleteRequest, EditRequest, PromoteRequest, VerifyOutcome};
pub use validation::{is_valid_bucket_name, is_valid_test_name, validate_basic_information};

/// Shared state of every job the service submits.
struct ServiceCore {
    stores: StoreSet,
    versions: Arc<dyn EnvironmentVersions>,
    engine: Arc<MatrixVerificationEngine>,
    machine: Arc<PromotionStateMachine>,
    cascade: AutopromoteCascade,
    hooks: Arc<HookRegistry>,
    comments: Option<Arc<dyn CommentFormatter>>,
    read_locks: TestReadLocks,
    url_base: String,
}

/// Orchestrates edits, deletions and promotions of test definitions.
pub struct DefinitionService {
    core: Arc<ServiceCore>,
    jobs: Arc<JobManager>,
}

impl DefinitionService {
    pub fn builder(
        stores: StoreSet,
        specifications: Arc<dyn SpecificationSource>,
    ) -> DefinitionServiceBuilder {
        DefinitionServiceBuilder {
            config: OrchestratorConfig::default(),
            stores,
            specifications,
            verifier: Arc::new(SpecificationVerifier),
            versions: None,
            promoter: None,
            hooks: HookRegistry::new(),
            job_hooks: JobHooks::new(),
            comments: None,
        }
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub fn engine(&self) -> &Arc<MatrixVerificationEngine> {
        &self.core.engine
    }

    pub fn versions(&self) -> &Arc<dyn EnvironmentVersions> {
        &self.core.versions
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Submit a create (empty previous revision) or edit of a trunk test.
    pub fn submit_edit(&self, mut request: EditRequest) -> ProctorResult<Arc<Job>> {
        let is_create = request.is_create();
        let kind = if is_create {
            ChangeKind::Create
        } else {
            ChangeKind::Update
        };
        request.comment = default_comment(kind, &request.test_name, &request.comment);

        let (verb, job_type) = if is_create {
            ("Creating", JobType::TestCreation)
        } else {
            ("Editing", JobType::TestEdit)
        };
        let title = format!(
            "({}) {} {}",
            request.credentials.username, verb, request.test_name
        );

        let core = self.core.clone();
        self.jobs.submit(title, job_type, move |job| async move {
            edit::run(&core, &job, &request).await
        })
    }

    pub fn submit_delete(&self, mut request: DeleteRequest) -> ProctorResult<Arc<Job>> {
        request.comment = default_comment(ChangeKind::Delete, &request.test_name, &request.comment);
        info!(
            test = %request.test_name,
            environment = %request.source,
            user = %request.credentials.username,
            "deleting test"
        );
        let title = format!(
            "({}) deleting {} branch: {} ",
            request.credentials.username, request.test_name, request.source
        );

        let core = self.core.clone();
        self.jobs.submit(title, JobType::TestDeletion, move |job| async move {
            delete::run(&core, &job, &request).await
        })
    }

    pub fn submit_promote(&self, request: PromoteRequest) -> ProctorResult<Arc<Job>> {
        let title = format!(
            "({}) promoting {} {} {} to {}",
            request.credentials.username,
            request.test_name,
            request.source,
            short_revision(&request.src_revision),
            request.destination
        );
        let promotion = PromotionRequest {
            test_name: request.test_name,
            source: request.source,
            src_revision: request.src_revision,
            destination: request.destination,
            dest_revision: request.dest_revision,
            credentials: request.credentials,
            metadata: request.metadata,
            autopromote: false,
        };

        let core = self.core.clone();
        self.jobs.submit(title, JobType::TestPromotion, move |job| async move {
            core.machine.promote(&job, &promotion).await
        })
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Run the verification engine without submitting a job.
    pub async fn check_matrix(
        &self,
        environment: Environment,
        test_name: &str,
        candidate: Option<&TestDefinition>,
    ) -> ProctorResult<CheckMatrixResult> {
        self.core
            .engine
            .check_matrix(environment, test_name, candidate)
            .await
    }

    /// Dry-run check of whether a promotion would pass verification.
    pub async fn verify_promotion(
        &self,
        test_name: &str,
        source: Environment,
        src_revision: &str,
        destination: Environment,
    ) -> ProctorResult<VerifyOutcome> {
        if source == destination {
            return Ok(VerifyOutcome::SameEnvironment);
        }
        let core = &self.core;
        let Some(definition) = lookup_definition(
            &core.stores,
            core.versions.as_ref(),
            source,
            test_name,
            src_revision,
        )?
        else {
            return Ok(VerifyOutcome::Missing {
                message: format!(
                    "could not find {} on {} with revision {}",
                    test_name, source, src_revision
                ),
            });
        };

        let result = core
            .engine
            .check_matrix(destination, test_name, Some(&definition))
            .await?;
        Ok(if result.is_valid {
            VerifyOutcome::Compatible
        } else {
            VerifyOutcome::Incompatible {
                errors: result.errors,
            }
        })
    }

    /// Definition, history and client usage of a test in `environment`.
    ///
    /// An empty `revision` reads the current definition. Fails with not
    /// found only when the test exists in no environment.
    pub async fn details(
        &self,
        environment: Environment,
        test_name: &str,
        revision: &str,
        with_definitions: bool,
    ) -> ProctorResult<DefinitionDetails> {
        let core = &self.core;
        let _guard = core.read_locks.lock(test_name).await;

        let version = core.versions.version_of(test_name)?;
        let lookup = |env: Environment| {
            lookup_definition(&core.stores, core.versions.as_ref(), env, test_name, revision)
        };

        let mut details = DefinitionDetails {
            environment,
            test_name: test_name.to_string(),
            definition: lookup(environment)?,
            version,
            history: Vec::new(),
            active_clients: BTreeMap::new(),
            error_message: None,
        };

        if details.definition.is_none() {
            info!(test = %test_name, revision = %revision, "unknown test definition");
            let mut elsewhere = false;
            for other in Environment::ALL.into_iter().filter(|e| *e != environment) {
                if lookup(other)?.is_some() {
                    elsewhere = true;
                    break;
                }
            }
            if !elsewhere {
                return Err(ProctorError::not_found(format!(
                    "Unknown test definition : {}",
                    test_name
                )));
            }
            let of_revision = if revision.is_empty() {
                String::new()
            } else {
                format!("of revision {} ", revision)
            };
            details.error_message = Some(format!(
                "Test \"{}\" {}does not exist in {} branch! Please check other branches.",
                test_name, of_revision, environment
            ));
            return Ok(details);
        }

        let store = core.stores.get(environment);
        let from = details
            .version
            .is_known(environment)
            .then(|| details.version.revision(environment).to_string());
        for entry in store.history(test_name, from.as_deref(), usize::MAX)? {
            let definition = if with_definitions {
                store.definition_at(test_name, &entry.revision)?
            } else {
                None
            };
            details.history.push(RevisionDefinition {
                revision: entry,
                definition,
            });
        }

        let specifications = core.engine.specifications();
        for env in Environment::ALL {
            details
                .active_clients
                .insert(env, specifications.active_clients(env, test_name)?);
        }
        Ok(details)
    }

    /// Client specification generated from the current definition.
    pub fn specification(
        &self,
        environment: Environment,
        test_name: &str,
    ) -> ProctorResult<TestSpecification> {
        let definition = self
            .core
            .stores
            .get(environment)
            .current_definition(test_name)?
            .ok_or_else(|| {
                ProctorError::not_found(format!("Unknown test definition : {}", test_name))
            })?;
        TestSpecification::generate(&definition)
    }
}

/// Assembles a [`DefinitionService`] from its collaborators.
pub struct DefinitionServiceBuilder {
    config: OrchestratorConfig,
    stores: StoreSet,
    specifications: Arc<dyn SpecificationSource>,
    verifier: Arc<dyn ClientVerifier>,
    versions: Option<Arc<dyn EnvironmentVersions>>,
    promoter: Option<Arc<dyn Promoter>>,
    hooks: HookRegistry,
    job_hooks: JobHooks,
    comments: Option<Arc<dyn CommentFormatter>>,
}

impl DefinitionServiceBuilder {
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ClientVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Defaults to a [`StoreVersionCache`] over the service's stores.
    pub fn with_versions(mut self, versions: Arc<dyn EnvironmentVersions>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Defaults to a [`StorePromoter`] over the service's stores.
    pub fn with_promoter(mut self, promoter: Arc<dyn Promoter>) -> Self {
        self.promoter = Some(promoter);
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_job_hooks(mut self, hooks: JobHooks) -> Self {
        self.job_hooks = hooks;
        self
    }

    pub fn with_comment_formatter(mut self, formatter: Arc<dyn CommentFormatter>) -> Self {
        self.comments = Some(formatter);
        self
    }

    pub fn build(self) -> ProctorResult<DefinitionService> {
        self.config
            .validate()
            .map_err(|e| ProctorError::wrap("Invalid orchestrator configuration", e))?;

        let stores = self.stores;
        let versions = self
            .versions
            .unwrap_or_else(|| Arc::new(StoreVersionCache::new(stores.clone())));
        let promoter = self
            .promoter
            .unwrap_or_else(|| Arc::new(StorePromoter::new(stores.clone())));
        let hooks = Arc::new(self.hooks);
        let engine = Arc::new(MatrixVerificationEngine::new(
            self.specifications,
            self.verifier,
            self.config.verify_executor_threads,
        ));
        let machine = Arc::new(PromotionStateMachine::new(
            stores.clone(),
            versions.clone(),
            engine.clone(),
            promoter,
            hooks.clone(),
            self.config.definition_url_base.clone(),
        ));
        let cascade = AutopromoteCascade::new(stores.clone(), versions.clone(), machine.clone());

        Ok(DefinitionService {
            core: Arc::new(ServiceCore {
                stores,
                versions,
                engine,
                machine,
                cascade,
                hooks,
                comments: self.comments,
                read_locks: TestReadLocks::new(),
                url_base: self.config.definition_url_base,
            }),
            jobs: Arc::new(JobManager::new(self.job_hooks).with_retention(self.config.retained_jobs)),
        })
    }
}
