//! Create and edit flow. Only trunk is ever edited directly.

use tracing::info;

use super::comments::format_full_comment;
use super::requests::EditRequest;
use super::validation::{
    validate_basic_information, validate_comment, validate_credentials, validate_test_name,
};
use super::ServiceCore;
use crate::errors::{ProctorError, ProctorResult};
use crate::hooks::{DefinitionChange, HookPhase};
use crate::job::{Job, ResultUrl};
use crate::model::{Environment, TestDefinition, UNKNOWN_REVISION};
use crate::promotion::CascadeEdit;
use crate::specification::check_internal_consistency;

pub(super) async fn run(core: &ServiceCore, job: &Job, request: &EditRequest) -> ProctorResult<()> {
    let test_name = request.test_name.as_str();
    let is_create = request.is_create();
    let store = core.stores.get(Environment::Working);
    // downstream revisions as they were before this edit
    let version = core.versions.version_of(test_name)?;

    if request.definition_json.trim().is_empty() {
        return Err(ProctorError::validation("No new test definition given"));
    }
    validate_credentials(&request.credentials)?;
    validate_comment(&request.comment)?;

    if is_create {
        validate_test_name(test_name)?;
    } else {
        job.log(format!("(scm) getting history for '{}'", test_name));
        if let Some(latest) = store.latest_revision(test_name)? {
            if latest.revision != request.previous_revision {
                return Err(ProctorError::StaleRevision {
                    expected: request.previous_revision.clone(),
                    actual: latest.revision,
                });
            }
        }
    }

    job.log("Parsing test definition json");
    let mut definition: TestDefinition = serde_json::from_str(&request.definition_json)
        .map_err(|e| ProctorError::wrap("Could not parse test definition json", e))?;

    job.log(format!("(scm) loading existing test definition for '{}'", test_name));
    let existing = store.current_definition(test_name)?;
    if is_create && existing.is_some() {
        return Err(ProctorError::validation(format!(
            "Current tests exists with name : '{}'",
            test_name
        )));
    }

    if let Some(existing) = &existing {
        if definition.test_type.is_none() {
            definition.test_type = existing.test_type;
        }
    }
    if is_create {
        definition.version = UNKNOWN_REVISION.to_string();
    } else if let Some(existing) = &existing {
        definition.version = existing.version.clone();
    }

    job.log("verifying test definition and buckets");
    validate_basic_information(&definition, job)?;
    check_internal_consistency(test_name, &definition)?;

    let (pre, post) = if is_create {
        (HookPhase::PreCreate, HookPhase::PostCreate)
    } else {
        (HookPhase::PreEdit, HookPhase::PostEdit)
    };
    let mut change = DefinitionChange {
        phase: pre,
        test_name,
        definition: Some(&definition),
        existing: existing.as_ref(),
        source: None,
        environment: Environment::Working,
        metadata: &request.metadata,
        autopromote: request.autopromote,
    };
    core.hooks.run(&change, job)?;

    let comment = format_full_comment(core.comments.as_deref(), &request.comment, &request.metadata);
    let written = if existing.is_none() {
        job.log("(scm) adding test definition");
        store.add(&request.credentials, test_name, &definition, &request.metadata, &comment)?
    } else {
        job.log("(scm) updating test definition");
        store.update(
            &request.credentials,
            &request.previous_revision,
            test_name,
            &definition,
            &request.metadata,
            &comment,
        )?
    };
    core.versions.refresh_working_version(test_name)?;
    info!(test = %test_name, revision = %written, create = is_create, "saved test definition");

    change.phase = post;
    core.hooks.run(&change, job)?;

    if request.autopromote {
        let edit = CascadeEdit {
            test_name,
            existing: existing.as_ref(),
            updated: &definition,
            working_revision: &written,
            version: &version,
            credentials: &request.credentials,
            metadata: &request.metadata,
        };
        core.cascade.run(job, &edit).await?;
    }

    job.log("COMPLETE");
    job.add_result_url(ResultUrl::new(
        format!("{}{}?branch={}", core.url_base, test_name, Environment::Working),
        "View Result",
    ));
    Ok(())
}
