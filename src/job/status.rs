//! Job status derivation
//!
//! A job's status is never stored directly. It is recomputed on every read
//! from the execution state and whether a terminal error was recorded, with
//! the precedence CANCELLED > FAILED > DONE > PENDING. An explicit override
//! set through [`Job::set_status`](super::Job::set_status) wins over
//! derivation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observable job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Done,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        }
    }

    /// True for every status except PENDING.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the task executing a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Not yet complete
    Running,
    /// Ran to completion, including after hooks
    Finished,
    /// Aborted before completion
    Cancelled,
}

/// Derive the status of a job.
pub fn derive_status(execution: Execution, has_error: bool) -> JobStatus {
    match execution {
        Execution::Running => JobStatus::Pending,
        Execution::Cancelled => JobStatus::Cancelled,
        Execution::Finished if has_error => JobStatus::Failed,
        Execution::Finished => JobStatus::Done,
    }
}
