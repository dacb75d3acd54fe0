//! Create and Edit Tests
//!
//! Trunk edits run as jobs: validation first, then the optimistic store
//! write, then hooks. Any failure leaves the stores untouched.

mod common;

use std::sync::Arc;

use common::*;
use proctor_orchestrator::errors::ErrorCategory;
use proctor_orchestrator::hooks::{
    DefinitionChange, DefinitionChangeHook, DefinitionChangeLog, HookPhase, HookRegistry,
};
use proctor_orchestrator::job::{JobStatus, JobType, ResultUrl};
use proctor_orchestrator::service::EditRequest;
use proctor_orchestrator::store::{Credentials, DefinitionStore, Metadata};

fn create_request() -> EditRequest {
    EditRequest {
        test_name: TEST_NAME.into(),
        definition_json: json(&definition(0.5, 0.5, 0.0)),
        previous_revision: String::new(),
        comment: String::new(),
        credentials: credentials(),
        autopromote: false,
        metadata: Metadata::new(),
    }
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn test_create_succeeds() {
    let h = Harness::new();
    let job = h.service.submit_edit(create_request()).unwrap();

    assert_eq!(job.title(), "(alice) Creating buttons");
    assert_eq!(job.job_type(), JobType::TestCreation);
    assert_eq!(finish(&job).await, JobStatus::Done);
    assert!(job.error().is_none());

    let stored = h.working.current_definition(TEST_NAME).unwrap().unwrap();
    assert_eq!(stored.version, "-1");
    let latest = h.working.latest_revision(TEST_NAME).unwrap().unwrap();
    assert_eq!(latest.message, "Creating A/B test buttons");
    assert_eq!(latest.author, "alice");

    let log = job.log_output();
    assert!(log.contains("Parsing test definition json\n"));
    assert!(log.contains("(scm) adding test definition\n"));
    assert!(log.ends_with("COMPLETE\n"));
    assert_eq!(
        job.urls(),
        vec![ResultUrl::new(
            "/proctor/definition/buttons?branch=trunk",
            "View Result"
        )]
    );
}

#[tokio::test]
async fn test_create_rejects_invalid_name() {
    let h = Harness::new();
    let mut request = create_request();
    request.test_name = "9buttons".into();

    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);
    assert_eq!(
        job.error().unwrap().to_string(),
        "Test Name must be alpha-numeric underscore and not start with a number, found: '9buttons'"
    );
    assert_eq!(h.total_mutations(), 0);
}

#[tokio::test]
async fn test_create_rejects_existing_test() {
    let h = Harness::new();
    h.working.seed(TEST_NAME, definition(0.5, 0.5, 0.0)).unwrap();

    let job = h.service.submit_edit(create_request()).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);
    assert_eq!(
        job.error().unwrap().to_string(),
        "Current tests exists with name : 'buttons'"
    );
    assert_eq!(h.working.mutation_count(), 1);
}

#[tokio::test]
async fn test_blank_credentials_fail_before_any_write() {
    let h = Harness::new();
    let mut request = create_request();
    request.credentials = Credentials::new("  ", "secret");

    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);
    let error = job.error().unwrap();
    assert_eq!(error.to_string(), "No username or password provided");
    assert_eq!(error.category(), ErrorCategory::Validation);
    assert_eq!(h.total_mutations(), 0);
}

#[tokio::test]
async fn test_empty_definition() {
    let h = Harness::new();
    let mut request = create_request();
    request.definition_json = "   ".into();

    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);
    assert_eq!(job.error().unwrap().to_string(), "No new test definition given");
}

#[tokio::test]
async fn test_unparseable_definition_logs_cause_chain() {
    let h = Harness::new();
    let mut request = create_request();
    request.definition_json = "{not json".into();

    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);
    let error = job.error().unwrap();
    assert_eq!(error.category(), ErrorCategory::Unexpected);

    let log = job.log_output();
    assert!(log.contains("Failed:\nCould not parse test definition json\n-- "));
}

#[tokio::test]
async fn test_internally_inconsistent_definition() {
    let h = Harness::new();
    let mut request = create_request();
    request.definition_json = json(&definition(0.5, 0.2, 0.0));

    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);
    assert_eq!(h.total_mutations(), 0);
}

// =============================================================================
// Edit
// =============================================================================

#[tokio::test]
async fn test_edit_keeps_version_and_inherits_type() {
    let h = Harness::new();
    let r1 = h.working.seed(TEST_NAME, definition(0.5, 0.5, 0.0)).unwrap();

    let mut updated = definition(0.4, 0.6, 0.0);
    updated.test_type = None;
    updated.version = "ignored".into();
    let request = EditRequest {
        definition_json: json(&updated),
        previous_revision: r1,
        comment: "  rebalance  ".into(),
        ..create_request()
    };

    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(job.title(), "(alice) Editing buttons");
    assert_eq!(job.job_type(), JobType::TestEdit);
    assert_eq!(finish(&job).await, JobStatus::Done, "{}", job.log_output());

    let stored = h.working.current_definition(TEST_NAME).unwrap().unwrap();
    assert_eq!(stored.version, "1");
    assert!(stored.test_type.is_some());
    let latest = h.working.latest_revision(TEST_NAME).unwrap().unwrap();
    assert_eq!(latest.message, "rebalance");
    assert!(job.log_output().contains("(scm) updating test definition\n"));
}

/// Editing at r1 while the store is at r2 is a conflict and writes nothing.
#[tokio::test]
async fn test_stale_revision_is_conflict() {
    let h = Harness::new();
    let r1 = h.working.seed(TEST_NAME, definition(0.5, 0.5, 0.0)).unwrap();
    let r2 = h
        .working
        .update(
            &credentials(),
            &r1,
            TEST_NAME,
            &definition(0.4, 0.6, 0.0),
            &Metadata::new(),
            "concurrent edit",
        )
        .unwrap();
    let before = h.working.mutation_count();

    let request = EditRequest {
        definition_json: json(&definition(0.3, 0.7, 0.0)),
        previous_revision: r1.clone(),
        comment: "mine".into(),
        ..create_request()
    };
    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);

    let error = job.error().unwrap();
    assert_eq!(error.category(), ErrorCategory::Conflict);
    assert_eq!(
        error.to_string(),
        format!("Test has been updated since {} currently at {}", r1, r2)
    );
    assert_eq!(h.working.mutation_count(), before);
}

#[tokio::test]
async fn test_access_denied_is_access_control() {
    let h = Harness::new();
    h.working.deny_user("alice").unwrap();

    let job = h.service.submit_edit(create_request()).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);
    assert_eq!(
        job.error().unwrap().category(),
        ErrorCategory::AccessControl
    );
}

// =============================================================================
// Hooks
// =============================================================================

struct RequireTicket;

impl DefinitionChangeHook for RequireTicket {
    fn name(&self) -> &str {
        "RequireTicket"
    }

    fn on_change(&self, change: &DefinitionChange<'_>) -> Option<DefinitionChangeLog> {
        let log = DefinitionChangeLog::new()
            .log_message(format!("checking ticket for {}", change.test_name))
            .with_url(ResultUrl::new("/tickets", "tickets"));
        if change.metadata.contains_key("ticket") {
            Some(log)
        } else {
            Some(log.with_error("missing ticket"))
        }
    }
}

#[tokio::test]
async fn test_pre_create_hook_failure_keeps_partial_output() {
    let hooks = HookRegistry::new().with(HookPhase::PreCreate, Arc::new(RequireTicket));
    let h = Harness::with_hooks(hooks);

    let job = h.service.submit_edit(create_request()).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Failed);

    let error = job.error().unwrap();
    assert_eq!(error.category(), ErrorCategory::Hook);
    assert_eq!(
        error.to_string(),
        "RequireTicket failed with the following errors: [missing ticket]"
    );
    assert!(job.log_output().contains("checking ticket for buttons\n"));
    assert_eq!(job.urls(), vec![ResultUrl::new("/tickets", "tickets")]);
    assert_eq!(h.total_mutations(), 0);
}

#[tokio::test]
async fn test_pre_create_hook_passes_with_ticket() {
    let hooks = HookRegistry::new().with(HookPhase::PreCreate, Arc::new(RequireTicket));
    let h = Harness::with_hooks(hooks);

    let mut request = create_request();
    request.metadata.insert("ticket".into(), "ABC-1".into());
    let job = h.service.submit_edit(request).unwrap();
    assert_eq!(finish(&job).await, JobStatus::Done);
    assert_eq!(h.working.mutation_count(), 1);
}
