use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::sync::models::{Checkpoint, SyncJob, SyncStatus};
use crate::sync::repositories::SyncJobRepository;
use intranet_common::error::{IntranetError, IntranetResult};

/// In-process [`SyncJobRepository`] with the same slot and resume rules as
/// the Postgres one. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySyncJobRepository {
    jobs: Arc<Mutex<Vec<SyncJob>>>,
}

impl MemorySyncJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row, e.g. a `partial` checkpoint left by an earlier run.
    pub fn insert(&self, job: SyncJob) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push(job);
        }
    }

    /// All rows in insertion order.
    pub fn snapshot(&self) -> Vec<SyncJob> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }

    fn lock(&self) -> IntranetResult<MutexGuard<'_, Vec<SyncJob>>> {
        self.jobs
            .lock()
            .map_err(|_| IntranetError::Internal("sync job store poisoned".to_string()))
    }
}

fn resume_point<'a>(jobs: &'a [SyncJob], job_type: &str) -> Option<&'a SyncJob> {
    jobs.iter()
        .filter(|j| j.job_type == job_type && j.status != SyncStatus::Running)
        .max_by_key(|j| j.created_at)
        .filter(|j| j.status.is_resumable())
}

#[async_trait]
impl SyncJobRepository for MemorySyncJobRepository {
    async fn acquire_slot(
        &self,
        job_type: &str,
        stale_after: Duration,
    ) -> IntranetResult<Option<SyncJob>> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .map_err(|e| IntranetError::Validation(format!("invalid stale_after: {e}")))?;
        let now = Utc::now();
        let mut jobs = self.lock()?;

        let cutoff = now - stale_after;
        for job in jobs.iter_mut().filter(|j| {
            j.job_type == job_type && j.status == SyncStatus::Running && j.updated_at < cutoff
        }) {
            job.status = SyncStatus::Partial;
            job.completed_at = Some(now);
            job.error_message =
                Some("invocation stopped reporting progress; resumable".to_string());
            job.updated_at = now;
        }

        if jobs
            .iter()
            .any(|j| j.job_type == job_type && j.status == SyncStatus::Running)
        {
            return Ok(None);
        }

        let mut job = SyncJob::start(job_type);
        if let Some(prev) = resume_point(&jobs, job_type) {
            let cp = prev.checkpoint();
            job.last_offset = cp.last_offset;
            job.total_processed = cp.total_processed;
        }
        jobs.push(job.clone());
        Ok(Some(job))
    }

    async fn find_resume_point(&self, job_type: &str) -> IntranetResult<Option<SyncJob>> {
        let jobs = self.lock()?;
        Ok(resume_point(&jobs, job_type).cloned())
    }

    async fn save_checkpoint(&self, id: Uuid, checkpoint: Checkpoint) -> IntranetResult<()> {
        let mut jobs = self.lock()?;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == SyncStatus::Running)
            .ok_or_else(|| IntranetError::Conflict(format!("sync job {id} is no longer running")))?;
        job.last_offset = job.last_offset.max(checkpoint.last_offset);
        job.total_processed = checkpoint.total_processed;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: SyncStatus,
        checkpoint: Checkpoint,
        error_message: Option<&str>,
    ) -> IntranetResult<SyncJob> {
        let mut jobs = self.lock()?;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| IntranetError::NotFound(format!("sync job {id}")))?;
        let now = Utc::now();
        job.status = status;
        job.last_offset = job.last_offset.max(checkpoint.last_offset);
        job.total_processed = checkpoint.total_processed;
        job.error_message = error_message.map(str::to_string);
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn latest(&self, job_type: &str) -> IntranetResult<Option<SyncJob>> {
        let jobs = self.lock()?;
        Ok(jobs
            .iter()
            .filter(|j| j.job_type == job_type)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn list_recent(&self, job_type: &str, limit: i64) -> IntranetResult<Vec<SyncJob>> {
        let jobs = self.lock()?;
        let mut rows: Vec<SyncJob> = jobs
            .iter()
            .rev()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(rows)
    }
}
