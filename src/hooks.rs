//! Definition change hooks
//!
//! Extension points run before and after every create, edit, delete and
//! promote. Each hook may return a [`DefinitionChangeLog`]; its links and
//! log lines are merged into the job first, then any reported errors abort
//! the enclosing operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{ProctorError, ProctorResult};
use crate::job::{Job, ResultUrl};
use crate::model::{Environment, TestDefinition};
use crate::store::Metadata;

/// Point in a definition change at which hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PreCreate,
    PostCreate,
    PreEdit,
    PostEdit,
    PreDelete,
    PostDelete,
    PrePromote,
    PostPromote,
}

impl HookPhase {
    /// Description used in the job log, e.g. `pre edit`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PreCreate => "pre create",
            Self::PostCreate => "post create",
            Self::PreEdit => "pre edit",
            Self::PostEdit => "post edit",
            Self::PreDelete => "pre delete",
            Self::PostDelete => "post delete",
            Self::PrePromote => "pre promote",
            Self::PostPromote => "post promote",
        }
    }
}

/// What is changing, handed to every hook.
#[derive(Debug, Clone, Copy)]
pub struct DefinitionChange<'a> {
    pub phase: HookPhase,
    pub test_name: &'a str,
    /// New definition; `None` for deletions
    pub definition: Option<&'a TestDefinition>,
    /// Definition being replaced, if any
    pub existing: Option<&'a TestDefinition>,
    /// Promotion source; `None` outside promotions
    pub source: Option<Environment>,
    /// Environment the change lands in
    pub environment: Environment,
    pub metadata: &'a Metadata,
    pub autopromote: bool,
}

/// Output of one hook call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionChangeLog {
    pub log: Vec<String>,
    pub urls: Vec<ResultUrl>,
    pub errors: Vec<String>,
}

impl DefinitionChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_message(mut self, message: impl Into<String>) -> Self {
        self.log.push(message.into());
        self
    }

    pub fn with_url(mut self, url: ResultUrl) -> Self {
        self.urls.push(url);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// An extension invoked on definition changes.
pub trait DefinitionChangeHook: Send + Sync {
    /// Name reported when the hook fails.
    fn name(&self) -> &str;

    fn on_change(&self, change: &DefinitionChange<'_>) -> Option<DefinitionChangeLog>;
}

/// Hooks per phase, in registration order.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<HookPhase, Vec<Arc<dyn DefinitionChangeHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to `phase`.
    pub fn with(mut self, phase: HookPhase, hook: Arc<dyn DefinitionChangeHook>) -> Self {
        self.register(phase, hook);
        self
    }

    pub fn register(&mut self, phase: HookPhase, hook: Arc<dyn DefinitionChangeHook>) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    pub fn hook_count(&self, phase: HookPhase) -> usize {
        self.hooks.get(&phase).map(Vec::len).unwrap_or(0)
    }

    /// Run every hook for `change.phase`, merging output into `job`.
    ///
    /// Stops at the first hook reporting errors.
    pub fn run(&self, change: &DefinitionChange<'_>, job: &Job) -> ProctorResult<()> {
        job.log(format!("Executing {} extension tasks.", change.phase.label()));
        let Some(hooks) = self.hooks.get(&change.phase) else {
            return Ok(());
        };

        for hook in hooks {
            debug!(hook = hook.name(), test = %change.test_name, phase = change.phase.label(), "running hook");
            let Some(output) = hook.on_change(change) else {
                continue;
            };
            for url in output.urls {
                job.add_result_url(url);
            }
            for line in &output.log {
                job.log(line);
            }
            if !output.errors.is_empty() {
                return Err(ProctorError::Hook {
                    hook: hook.name().to_string(),
                    errors: output.errors,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(&'static str, usize)> = self
            .hooks
            .iter()
            .map(|(phase, hooks)| (phase.label(), hooks.len()))
            .collect();
        counts.sort();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}
