//! Job-level hooks
//!
//! Hooks that run around every job, independent of what the job does.
//! Before hooks run in registration order ahead of the operation; the first
//! failure ends the job. After hooks receive the operation's result, which
//! is `None` when the operation failed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::background::Job;
use crate::errors::ProctorResult;

/// Runs before a job's operation.
pub trait BeforeJobHook: Send + Sync {
    fn before_execute(&self, job: &Job) -> ProctorResult<()>;
}

/// Runs after a job's operation, whatever its outcome.
pub trait AfterJobHook: Send + Sync {
    fn after_execute(&self, job: &Job, result: Option<&(dyn Any + Send)>) -> ProctorResult<()>;
}

/// Ordered before/after hook lists shared by every job.
#[derive(Clone, Default)]
pub struct JobHooks {
    before: Vec<Arc<dyn BeforeJobHook>>,
    after: Vec<Arc<dyn AfterJobHook>>,
}

impl JobHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a before hook.
    pub fn with_before(mut self, hook: impl BeforeJobHook + 'static) -> Self {
        self.before.push(Arc::new(hook));
        self
    }

    /// Append an after hook.
    pub fn with_after(mut self, hook: impl AfterJobHook + 'static) -> Self {
        self.after.push(Arc::new(hook));
        self
    }

    pub fn before(&self) -> &[Arc<dyn BeforeJobHook>] {
        &self.before
    }

    pub fn after(&self) -> &[Arc<dyn AfterJobHook>] {
        &self.after
    }
}

impl fmt::Debug for JobHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHooks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}
