//! Promotion protocol
//!
//! Runs one legal [`Transition`] end to end: credential check, source load,
//! matrix verification against the destination, pre hooks, the store-level
//! promotion, post hooks and the summary line. Post hook failures leave the
//! promotion applied.

use std::sync::Arc;

use tracing::info;

use super::errors::PromotionError;
use super::promoter::Promoter;
use super::transition::Transition;
use crate::errors::{ProctorError, ProctorResult};
use crate::hooks::{DefinitionChange, HookPhase, HookRegistry};
use crate::job::{Job, ResultUrl};
use crate::matrix::MatrixVerificationEngine;
use crate::model::{short_revision, Environment};
use crate::store::{lookup_definition, Credentials, EnvironmentVersions, Metadata, StoreSet};

/// Inputs of a single promotion.
#[derive(Debug, Clone)]
pub struct PromotionRequest {
    pub test_name: String,
    pub source: Environment,
    pub src_revision: String,
    pub destination: Environment,
    pub dest_revision: String,
    pub credentials: Credentials,
    pub metadata: Metadata,
    pub autopromote: bool,
}

/// Executes promotions between environments.
pub struct PromotionStateMachine {
    stores: StoreSet,
    versions: Arc<dyn EnvironmentVersions>,
    engine: Arc<MatrixVerificationEngine>,
    promoter: Arc<dyn Promoter>,
    hooks: Arc<HookRegistry>,
    url_base: String,
}

impl PromotionStateMachine {
    pub fn new(
        stores: StoreSet,
        versions: Arc<dyn EnvironmentVersions>,
        engine: Arc<MatrixVerificationEngine>,
        promoter: Arc<dyn Promoter>,
        hooks: Arc<HookRegistry>,
        url_base: impl Into<String>,
    ) -> Self {
        Self {
            stores,
            versions,
            engine,
            promoter,
            hooks,
            url_base: url_base.into(),
        }
    }

    /// Promote `request.test_name` from source to destination.
    ///
    /// Illegal pairs fail before any store is read.
    pub async fn promote(&self, job: &Job, request: &PromotionRequest) -> ProctorResult<()> {
        let transition = Transition::between(request.source, request.destination)?;
        let test_name = request.test_name.as_str();

        if request.credentials.is_blank() {
            return Err(ProctorError::validation("No username or password provided"));
        }

        let definition = lookup_definition(
            &self.stores,
            self.versions.as_ref(),
            request.source,
            test_name,
            &request.src_revision,
        )?
        .ok_or_else(|| {
            PromotionError::source_missing(test_name, request.source, &request.src_revision)
        })?;

        let result = self
            .engine
            .check_matrix(request.destination, test_name, Some(&definition))
            .await?;
        if !result.is_valid {
            return Err(ProctorError::IncompatibleMatrix {
                errors: result.errors,
            });
        }

        let existing = self
            .stores
            .get(request.destination)
            .current_definition(test_name)?;
        let mut change = DefinitionChange {
            phase: HookPhase::PrePromote,
            test_name,
            definition: Some(&definition),
            existing: existing.as_ref(),
            source: Some(request.source),
            environment: request.destination,
            metadata: &request.metadata,
            autopromote: request.autopromote,
        };
        self.hooks.run(&change, job)?;

        let promoted = transition.action(self.promoter.as_ref()).promote_test(
            job,
            test_name,
            &request.src_revision,
            &request.dest_revision,
            &request.credentials,
            &request.metadata,
        );
        // destination revisions moved whether or not the promoter succeeded
        self.versions.invalidate(test_name)?;
        promoted?;

        change.phase = HookPhase::PostPromote;
        self.hooks.run(&change, job)?;

        info!(
            test = %test_name,
            transition = %transition,
            autopromote = request.autopromote,
            "promoted test"
        );
        job.log(format!(
            "Promoted {} from {} ({}) to {} ({})",
            test_name,
            request.source,
            short_revision(&request.src_revision),
            request.destination,
            short_revision(&request.dest_revision)
        ));
        job.add_result_url(ResultUrl::new(
            format!("{}{}?branch={}", self.url_base, test_name, request.destination),
            format!("view {} on {}", test_name, request.destination),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use crate::job::JobType;
    use crate::model::{Allocation, Range, TestBucket, TestDefinition, UNKNOWN_REVISION};
    use crate::promotion::StorePromoter;
    use crate::specification::{InMemorySpecificationSource, SpecificationVerifier};
    use crate::store::{DefinitionStore, InMemoryStore, StoreVersionCache};

    struct Fixture {
        working: Arc<InMemoryStore>,
        qa: Arc<InMemoryStore>,
        production: Arc<InMemoryStore>,
        machine: PromotionStateMachine,
    }

    fn definition() -> TestDefinition {
        TestDefinition {
            salt: "buttons".into(),
            description: "button colours".into(),
            buckets: vec![TestBucket::new("control", 0), TestBucket::new("blue", 1)],
            allocations: vec![Allocation::new(
                None,
                vec![Range::new(0, 0.5), Range::new(1, 0.5)],
            )],
            ..Default::default()
        }
    }

    fn fixture() -> Fixture {
        let working = Arc::new(InMemoryStore::new(Environment::Working));
        let qa = Arc::new(InMemoryStore::new(Environment::Qa));
        let production = Arc::new(InMemoryStore::new(Environment::Production));
        let stores = StoreSet::new(working.clone(), qa.clone(), production.clone());
        let engine = Arc::new(MatrixVerificationEngine::new(
            Arc::new(InMemorySpecificationSource::new()),
            Arc::new(SpecificationVerifier),
            2,
        ));
        let machine = PromotionStateMachine::new(
            stores.clone(),
            Arc::new(StoreVersionCache::new(stores.clone())),
            engine,
            Arc::new(StorePromoter::new(stores)),
            Arc::new(HookRegistry::new()),
            "/proctor/definition/",
        );
        Fixture {
            working,
            qa,
            production,
            machine,
        }
    }

    fn request(source: Environment, destination: Environment, src: &str) -> PromotionRequest {
        PromotionRequest {
            test_name: "buttons".into(),
            source,
            src_revision: src.into(),
            destination,
            dest_revision: UNKNOWN_REVISION.into(),
            credentials: Credentials::new("alice", "pw"),
            metadata: Metadata::new(),
            autopromote: false,
        }
    }

    #[tokio::test]
    async fn test_promote_working_to_qa() {
        let f = fixture();
        let rev = f.working.seed("buttons", definition()).unwrap();
        let job = Job::new(1, "promote", JobType::TestPromotion);

        f.machine
            .promote(&job, &request(Environment::Working, Environment::Qa, &rev))
            .await
            .unwrap();

        assert!(f.qa.current_definition("buttons").unwrap().is_some());
        let log = job.log_output();
        assert!(log.contains("(scm) promote buttons t1 (trunk to qa)\n"));
        assert!(log.contains("Promoted buttons from trunk (t1) to qa (-1)\n"));
        assert_eq!(
            job.urls(),
            vec![ResultUrl::new(
                "/proctor/definition/buttons?branch=qa",
                "view buttons on qa"
            )]
        );
    }

    #[tokio::test]
    async fn test_illegal_transition_touches_no_store() {
        let f = fixture();
        let job = Job::new(1, "promote", JobType::TestPromotion);
        let err = f
            .machine
            .promote(&job, &request(Environment::Production, Environment::Qa, ""))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.to_string().contains("source=production dest=qa"));
        assert_eq!(f.qa.mutation_count(), 0);
        assert_eq!(f.production.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_credentials() {
        let f = fixture();
        let rev = f.working.seed("buttons", definition()).unwrap();
        let mut req = request(Environment::Working, Environment::Production, &rev);
        req.credentials = Credentials::new("alice", "");
        let job = Job::new(1, "promote", JobType::TestPromotion);

        let err = f.machine.promote(&job, &req).await.unwrap_err();
        assert_eq!(err.to_string(), "No username or password provided");
        assert_eq!(f.production.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let f = fixture();
        let job = Job::new(1, "promote", JobType::TestPromotion);
        let err = f
            .machine
            .promote(&job, &request(Environment::Qa, Environment::Production, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ProctorError::Promotion(_)));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
