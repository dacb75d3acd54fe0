//! Background Jobs
//!
//! Every mutating operation runs as a [`Job`] submitted through the
//! [`JobManager`]. Callers get the job back immediately and observe its log,
//! result links and status while it runs on the tokio runtime.

mod background;
mod hooks;
mod manager;
mod status;

pub use background::{Job, JobType, ResultUrl};
pub use hooks::{AfterJobHook, BeforeJobHook, JobHooks};
pub use manager::{JobManager, DEFAULT_RETAINED_JOBS};
pub use status::{derive_status, Execution, JobStatus};
