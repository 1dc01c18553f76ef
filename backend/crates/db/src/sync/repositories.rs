use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::sync::models::{Checkpoint, SyncJob, SyncStatus};
use intranet_common::error::IntranetResult;

#[async_trait]
pub trait SyncJobRepository: Send + Sync {
    /// Claim the job slot for `job_type` by inserting a new `running` row.
    ///
    /// `running` rows not touched for `stale_after` are first demoted to
    /// `partial` so a crashed invocation cannot hold the slot forever. The
    /// new row starts at the checkpoint of [`Self::find_resume_point`], read
    /// in the same atomic step. Returns `None` if a live invocation already
    /// holds the slot.
    async fn acquire_slot(&self, job_type: &str, stale_after: Duration)
        -> IntranetResult<Option<SyncJob>>;

    /// Most recent finished row for `job_type`, if it is `partial` or `error`.
    async fn find_resume_point(&self, job_type: &str) -> IntranetResult<Option<SyncJob>>;

    /// Persist progress on a running row.
    async fn save_checkpoint(&self, id: Uuid, checkpoint: Checkpoint) -> IntranetResult<()>;

    /// Write a terminal status, releasing the slot.
    async fn finish(
        &self,
        id: Uuid,
        status: SyncStatus,
        checkpoint: Checkpoint,
        error_message: Option<&str>,
    ) -> IntranetResult<SyncJob>;

    async fn latest(&self, job_type: &str) -> IntranetResult<Option<SyncJob>>;

    async fn list_recent(&self, job_type: &str, limit: i64) -> IntranetResult<Vec<SyncJob>>;
}

#[async_trait]
impl<R: SyncJobRepository + ?Sized> SyncJobRepository for std::sync::Arc<R> {
    async fn acquire_slot(
        &self,
        job_type: &str,
        stale_after: Duration,
    ) -> IntranetResult<Option<SyncJob>> {
        (**self).acquire_slot(job_type, stale_after).await
    }

    async fn find_resume_point(&self, job_type: &str) -> IntranetResult<Option<SyncJob>> {
        (**self).find_resume_point(job_type).await
    }

    async fn save_checkpoint(&self, id: Uuid, checkpoint: Checkpoint) -> IntranetResult<()> {
        (**self).save_checkpoint(id, checkpoint).await
    }

    async fn finish(
        &self,
        id: Uuid,
        status: SyncStatus,
        checkpoint: Checkpoint,
        error_message: Option<&str>,
    ) -> IntranetResult<SyncJob> {
        (**self).finish(id, status, checkpoint, error_message).await
    }

    async fn latest(&self, job_type: &str) -> IntranetResult<Option<SyncJob>> {
        (**self).latest(job_type).await
    }

    async fn list_recent(&self, job_type: &str, limit: i64) -> IntranetResult<Vec<SyncJob>> {
        (**self).list_recent(job_type, limit).await
    }
}
