//! Job registry and submission

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::task::AbortHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::background::{Job, JobType};
use super::hooks::JobHooks;
use crate::errors::{ProctorError, ProctorResult};

struct JobEntry {
    job: Arc<Job>,
    abort: AbortHandle,
}

/// Jobs kept for lookup unless configured otherwise.
pub const DEFAULT_RETAINED_JOBS: usize = 1000;

/// Submits jobs onto the tokio runtime and keeps them for lookup.
///
/// At most `retained` jobs are kept; the oldest completed jobs are evicted
/// first and running jobs are never evicted.
pub struct JobManager {
    next_id: AtomicU64,
    jobs: RwLock<BTreeMap<u64, JobEntry>>,
    hooks: JobHooks,
    retained: usize,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new(JobHooks::default())
    }
}

impl JobManager {
    pub fn new(hooks: JobHooks) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: RwLock::new(BTreeMap::new()),
            hooks,
            retained: DEFAULT_RETAINED_JOBS,
        }
    }

    /// Keep at most `retained` jobs (minimum one).
    pub fn with_retention(mut self, retained: usize) -> Self {
        self.retained = retained.max(1);
        self
    }

    /// Spawn `operation` as a new job and return it immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<T, F, Fut>(
        &self,
        title: impl Into<String>,
        job_type: JobType,
        operation: F,
    ) -> ProctorResult<Arc<Job>>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Job>) -> Fut + Send + 'static,
        Fut: Future<Output = ProctorResult<T>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Arc::new(Job::new(id, title, job_type));

        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| ProctorError::unexpected("Lock poisoned"))?;
        let handle = tokio::spawn(job.clone().run(self.hooks.clone(), operation));
        jobs.insert(
            id,
            JobEntry {
                job: job.clone(),
                abort: handle.abort_handle(),
            },
        );
        evict_completed(&mut jobs, self.retained);

        info!(job_id = id, uuid = %job.uuid(), title = %job.title(), job_type = %job_type, "submitted job");
        Ok(job)
    }

    pub fn get(&self, id: u64) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .ok()
            .and_then(|jobs| jobs.get(&id).map(|e| e.job.clone()))
    }

    pub fn get_by_uuid(&self, uuid: Uuid) -> Option<Arc<Job>> {
        self.jobs.read().ok().and_then(|jobs| {
            jobs.values()
                .find(|e| e.job.uuid() == uuid)
                .map(|e| e.job.clone())
        })
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<Arc<Job>> {
        self.jobs
            .read()
            .map(|jobs| jobs.values().rev().map(|e| e.job.clone()).collect())
            .unwrap_or_default()
    }

    /// Abort a running job. Returns false if it had already completed.
    pub fn cancel(&self, id: u64) -> ProctorResult<bool> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| ProctorError::unexpected("Lock poisoned"))?;
        let entry = jobs
            .get(&id)
            .ok_or_else(|| ProctorError::not_found(format!("Unknown job {}", id)))?;

        if !entry.job.mark_cancelled() {
            return Ok(false);
        }
        entry.abort.abort();
        info!(job_id = id, "cancelled job");
        Ok(true)
    }
}

/// Drop the oldest completed jobs until at most `retained` remain.
fn evict_completed(jobs: &mut BTreeMap<u64, JobEntry>, retained: usize) {
    let excess = jobs.len().saturating_sub(retained);
    if excess == 0 {
        return;
    }
    let evicted: Vec<u64> = jobs
        .iter()
        .filter(|(_, e)| !e.job.is_running())
        .map(|(id, _)| *id)
        .take(excess)
        .collect();
    for id in &evicted {
        jobs.remove(id);
    }
    debug!(evicted = evicted.len(), retained, "evicted completed jobs");
}
