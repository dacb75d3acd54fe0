//! Delete flow

use tracing::info;

use super::comments::format_full_comment;
use super::requests::DeleteRequest;
use super::validation::validate_credentials;
use super::ServiceCore;
use crate::errors::{ProctorError, ProctorResult};
use crate::hooks::{DefinitionChange, HookPhase};
use crate::job::{Job, ResultUrl};
use crate::model::Environment;

pub(super) async fn run(core: &ServiceCore, job: &Job, request: &DeleteRequest) -> ProctorResult<()> {
    let test_name = request.test_name.as_str();
    let source = request.source;
    let store = core.stores.get(source);

    let Some(definition) = store.current_definition(test_name)? else {
        job.log(format!("Unknown test definition : {}", test_name));
        return Ok(());
    };

    validate_credentials(&request.credentials)?;

    job.log(format!("(scm) getting history for '{}'", test_name));
    match store.latest_revision(test_name)? {
        Some(latest) if latest.revision != request.src_revision => {
            return Err(ProctorError::StaleRevision {
                expected: request.src_revision.clone(),
                actual: latest.revision,
            });
        }
        Some(_) => {}
        None => {
            return Err(ProctorError::validation(format!(
                "Could not get any history for {}",
                test_name
            )));
        }
    }

    let comment = format_full_comment(core.comments.as_deref(), &request.comment, &request.metadata);

    // a test still required by any client may not go away
    let checks: &[(Environment, &str)] = match source {
        Environment::Working | Environment::Qa => &[
            (Environment::Qa, "QA"),
            (Environment::Production, "prod"),
        ],
        Environment::Production => &[(Environment::Production, "prod")],
    };
    for (environment, label) in checks {
        let result = core.engine.check_matrix(*environment, test_name, None).await?;
        if let Some(first) = result.errors.first() {
            return Err(ProctorError::validation(format!(
                "There are still clients in {} using {} {}",
                label, test_name, first
            )));
        }
    }

    let mut change = DefinitionChange {
        phase: HookPhase::PreDelete,
        test_name,
        definition: None,
        existing: Some(&definition),
        source: None,
        environment: source,
        metadata: &request.metadata,
        autopromote: false,
    };
    core.hooks.run(&change, job)?;

    job.log(format!("(scm) delete {}", test_name));
    store.delete(
        &request.credentials,
        &request.src_revision,
        test_name,
        &definition,
        &comment,
    )?;
    core.versions.invalidate(test_name)?;
    info!(test = %test_name, environment = %source, "deleted test definition");

    let mut exists_elsewhere = false;
    for other in Environment::ALL.into_iter().filter(|e| *e != source) {
        if core.stores.get(other).current_definition(test_name)?.is_some() {
            exists_elsewhere = true;
            job.add_result_url(ResultUrl::new(
                format!("{}{}?branch={}", core.url_base, test_name, other),
                format!("view {} on {}", test_name, other),
            ));
        }
    }
    if !exists_elsewhere {
        job.set_end_message("This test no longer exists in any environment.");
    }

    change.phase = HookPhase::PostDelete;
    core.hooks.run(&change, job)?;
    Ok(())
}
