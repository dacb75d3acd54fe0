//! Background job
//!
//! A [`Job`] wraps one mutating operation and makes its progress observable:
//! an append-only log, result links, an optional terminal error and a
//! derived status. Jobs are created once per request and never reused.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use super::hooks::JobHooks;
use super::status::{derive_status, Execution, JobStatus};
use crate::errors::{ProctorError, ProctorResult};

/// Prefix added once per cause depth in failure logs.
const CAUSE_MARKER: &str = "-- ";

/// Kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    TestCreation,
    TestEdit,
    TestDeletion,
    TestPromotion,
    #[default]
    Unknown,
}

impl JobType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TestCreation => "test-creation",
            Self::TestEdit => "test-edit",
            Self::TestDeletion => "test-deletion",
            Self::TestPromotion => "test-promotion",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Link shown to the user once a job completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultUrl {
    pub href: String,
    pub text: String,
    /// Link target, empty for the current window
    pub target: String,
}

impl ResultUrl {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
            target: String::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

#[derive(Debug)]
struct JobState {
    log: String,
    urls: Vec<ResultUrl>,
    end_message: String,
    error: Option<Arc<ProctorError>>,
    execution: Execution,
    /// Set once the operation has returned, before after hooks run
    execute_finished: bool,
    status_override: Option<JobStatus>,
}

/// Observable unit of asynchronous work.
#[derive(Debug)]
pub struct Job {
    id: u64,
    uuid: Uuid,
    title: String,
    job_type: JobType,
    created_at: DateTime<Utc>,
    state: Mutex<JobState>,
    done: watch::Sender<bool>,
}

impl Job {
    pub fn new(id: u64, title: impl Into<String>, job_type: JobType) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            id,
            uuid: Uuid::new_v4(),
            title: title.into(),
            job_type,
            created_at: Utc::now(),
            state: Mutex::new(JobState {
                log: String::new(),
                urls: Vec::new(),
                end_message: String::new(),
                error: None,
                execution: Execution::Running,
                execute_finished: false,
                status_override: None,
            }),
            done,
        }
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // =========================================================================
    // OBSERVABLE STATE
    // =========================================================================

    /// Append a line to the job log.
    pub fn log(&self, message: impl AsRef<str>) {
        let mut state = self.state();
        state.log.push_str(message.as_ref());
        state.log.push('\n');
    }

    /// Full log so far.
    pub fn log_output(&self) -> String {
        self.state().log.clone()
    }

    pub fn add_url(&self, href: impl Into<String>, text: impl Into<String>) {
        self.add_result_url(ResultUrl::new(href, text));
    }

    pub fn add_result_url(&self, url: ResultUrl) {
        self.state().urls.push(url);
    }

    pub fn urls(&self) -> Vec<ResultUrl> {
        self.state().urls.clone()
    }

    pub fn end_message(&self) -> String {
        self.state().end_message.clone()
    }

    pub fn set_end_message(&self, message: impl Into<String>) {
        self.state().end_message = message.into();
    }

    /// Terminal error, if one was recorded.
    pub fn error(&self) -> Option<Arc<ProctorError>> {
        self.state().error.clone()
    }

    /// Current status; see [`derive_status`].
    pub fn status(&self) -> JobStatus {
        let state = self.state();
        state
            .status_override
            .unwrap_or_else(|| derive_status(state.execution, state.error.is_some()))
    }

    /// Pin the status, bypassing derivation.
    pub fn set_status(&self, status: JobStatus) {
        self.state().status_override = Some(status);
    }

    pub fn is_running(&self) -> bool {
        self.state().execution == Execution::Running
    }

    /// Resolves once the job has completed or been cancelled.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Log a failure and its cause chain.
    ///
    /// The first line is the error itself; each cause is prefixed with one
    /// more `-- ` than the line above. The error becomes the job's terminal
    /// error unless the operation already returned or the job was cancelled.
    pub fn log_failed_job(&self, err: ProctorError) {
        self.log("Failed:");
        let mut depth = 0;
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(e) = cause {
            self.log(format!("{}{}", CAUSE_MARKER.repeat(depth), e));
            cause = e.source();
            depth += 1;
        }

        let mut state = self.state();
        if !state.execute_finished && state.execution != Execution::Cancelled {
            state.error = Some(Arc::new(err));
        }
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Mark a still-running job cancelled. Returns false if it had already
    /// completed.
    pub(crate) fn mark_cancelled(&self) -> bool {
        let cancelled = {
            let mut state = self.state();
            if state.execution == Execution::Running {
                state.execution = Execution::Cancelled;
                true
            } else {
                false
            }
        };
        if cancelled {
            self.done.send_replace(true);
        }
        cancelled
    }

    fn mark_finished(&self) {
        {
            let mut state = self.state();
            if state.execution == Execution::Running {
                state.execution = Execution::Finished;
            }
        }
        self.done.send_replace(true);
    }

    /// Run `operation` between the job-level hooks.
    ///
    /// Never fails: every error is logged into the job and the result is
    /// `None`. After hooks see the operation's result.
    pub async fn run<T, F, Fut>(self: Arc<Self>, hooks: JobHooks, operation: F) -> Option<T>
    where
        T: Any + Send,
        F: FnOnce(Arc<Job>) -> Fut,
        Fut: Future<Output = ProctorResult<T>>,
    {
        let mut guard = CompletionGuard {
            job: &*self,
            completed: false,
        };

        for hook in hooks.before() {
            if let Err(e) = hook.before_execute(&self) {
                self.trace_failure("before job hook", &e);
                self.log_failed_job(e);
                guard.completed = true;
                return None;
            }
        }

        let result = match operation(self.clone()).await {
            Ok(value) => Some(value),
            Err(e) => {
                self.trace_failure("job", &e);
                self.log_failed_job(e);
                None
            }
        };
        self.state().execute_finished = true;

        for hook in hooks.after() {
            let value = result.as_ref().map(|v| v as &(dyn Any + Send));
            if let Err(e) = hook.after_execute(&self, value) {
                self.trace_failure("after job hook", &e);
                self.log_failed_job(e);
                break;
            }
        }

        guard.completed = true;
        result
    }

    fn trace_failure(&self, stage: &str, err: &ProctorError) {
        let category = err.category();
        if category.is_user_error() {
            info!(job_id = self.id, title = %self.title, %category, error = %err, "{} failed", stage);
        } else {
            error!(job_id = self.id, title = %self.title, %category, error = %err, "{} failed", stage);
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.status())
    }
}

/// Settles the job's execution state however `run` exits.
struct CompletionGuard<'a> {
    job: &'a Job,
    completed: bool,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.job.state();
            if !state.execute_finished && state.execution == Execution::Running {
                state.error = Some(Arc::new(ProctorError::unexpected("Job panicked")));
            }
            drop(state);
            self.job.mark_finished();
        } else if self.completed {
            self.job.mark_finished();
        } else {
            // dropped mid-flight: the task was aborted
            self.job.mark_cancelled();
        }
    }
}
