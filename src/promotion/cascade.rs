//! Autopromote cascade
//!
//! After an allocation-only edit to trunk, the same change is pushed on to
//! qa and then production, provided each downstream copy differs from the
//! edit only in allocations. The edit itself is never rolled back.

use std::sync::Arc;

use tracing::info;

use super::machine::{PromotionRequest, PromotionStateMachine};
use crate::allocation::is_allocation_only_change;
use crate::errors::ProctorResult;
use crate::job::Job;
use crate::model::{Environment, EnvironmentVersion, TestDefinition, UNKNOWN_REVISION};
use crate::store::{lookup_definition, Credentials, EnvironmentVersions, Metadata, StoreSet};

/// A completed trunk edit that may be cascaded.
#[derive(Debug, Clone, Copy)]
pub struct CascadeEdit<'a> {
    pub test_name: &'a str,
    /// Definition before the edit; `None` for creations
    pub existing: Option<&'a TestDefinition>,
    pub updated: &'a TestDefinition,
    /// Trunk revision written by the edit
    pub working_revision: &'a str,
    /// Versions observed when the edit started
    pub version: &'a EnvironmentVersion,
    pub credentials: &'a Credentials,
    pub metadata: &'a Metadata,
}

/// Which stages an edit was carried to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub qa_promoted: bool,
    pub production_promoted: bool,
}

pub struct AutopromoteCascade {
    stores: StoreSet,
    versions: Arc<dyn EnvironmentVersions>,
    machine: Arc<PromotionStateMachine>,
}

impl AutopromoteCascade {
    pub fn new(
        stores: StoreSet,
        versions: Arc<dyn EnvironmentVersions>,
        machine: Arc<PromotionStateMachine>,
    ) -> Self {
        Self {
            stores,
            versions,
            machine,
        }
    }

    /// Cascade `edit` downstream. A failed promotion is returned as an
    /// error; whatever was already promoted stays promoted.
    pub async fn run(&self, job: &Job, edit: &CascadeEdit<'_>) -> ProctorResult<CascadeOutcome> {
        let mut outcome = CascadeOutcome::default();
        let Some(existing) = edit.existing else {
            return Ok(outcome);
        };
        if !is_allocation_only_change(existing, edit.updated) {
            return Ok(outcome);
        }

        let qa_revision = edit.version.revision(Environment::Qa);
        let production_revision = edit.version.revision(Environment::Production);
        job.log(format!(
            "allocation only change, checking against other branches for auto-promote capability for test {}\nat QA revision {} and PRODUCTION revision {}",
            edit.test_name, qa_revision, production_revision
        ));

        if self.qualifies(Environment::Qa, edit, qa_revision)? {
            job.log("auto-promoting changes to QA");
            self.machine
                .promote(job, &self.request(edit, Environment::Qa, qa_revision))
                .await?;
            outcome.qa_promoted = true;
        } else {
            job.log("auto-promote to QA blocked by previous revision changes");
        }

        if outcome.qa_promoted
            && self.qualifies(Environment::Production, edit, production_revision)?
        {
            job.log("auto-promoting changes to PRODUCTION");
            self.machine
                .promote(
                    job,
                    &self.request(edit, Environment::Production, production_revision),
                )
                .await?;
            outcome.production_promoted = true;
        } else {
            job.log("auto-promote to PRODUCTION blocked by previous revision changes");
        }

        info!(
            test = %edit.test_name,
            qa = outcome.qa_promoted,
            production = outcome.production_promoted,
            "autopromote cascade finished"
        );
        Ok(outcome)
    }

    /// The live copy in `environment` exists and differs from the edit only
    /// in allocations.
    fn qualifies(
        &self,
        environment: Environment,
        edit: &CascadeEdit<'_>,
        revision: &str,
    ) -> ProctorResult<bool> {
        if revision == UNKNOWN_REVISION {
            return Ok(false);
        }
        let current = lookup_definition(
            &self.stores,
            self.versions.as_ref(),
            environment,
            edit.test_name,
            revision,
        )?;
        Ok(current.is_some_and(|d| is_allocation_only_change(&d, edit.updated)))
    }

    fn request(
        &self,
        edit: &CascadeEdit<'_>,
        destination: Environment,
        dest_revision: &str,
    ) -> PromotionRequest {
        PromotionRequest {
            test_name: edit.test_name.to_string(),
            source: Environment::Working,
            src_revision: edit.working_revision.to_string(),
            destination,
            dest_revision: dest_revision.to_string(),
            credentials: edit.credentials.clone(),
            metadata: edit.metadata.clone(),
            autopromote: true,
        }
    }
}
