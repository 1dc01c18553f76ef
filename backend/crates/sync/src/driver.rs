use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use intranet_common::error::IntranetError;
use intranet_db::advbox::repositories::EntityStore;
use intranet_db::sync::models::{Checkpoint, SyncJob, SyncStatus};
use intranet_db::sync::repositories::SyncJobRepository;

use crate::clock::Clock;
use crate::error::SyncError;
use crate::settings::SyncSettings;
use crate::sink::{upsert_with_policy, BatchOutcome};
use crate::source::PageSource;

/// Result of one invocation, returned on every exit path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub job_type: String,
    pub status: SyncStatus,
    pub total_processed: u64,
    pub last_offset: u64,
    pub processed_this_run: u64,
    pub pages_fetched: u32,
    pub message: String,
    /// Row written for this invocation; `None` if none was.
    pub job_id: Option<Uuid>,
}

impl SyncSummary {
    /// Summary for a run refused before any row was written.
    pub fn not_started(job_type: &str, error: &SyncError) -> Self {
        Self {
            job_type: job_type.to_string(),
            status: SyncStatus::Error,
            total_processed: 0,
            last_offset: 0,
            processed_this_run: 0,
            pages_fetched: 0,
            message: format!("Sync not started: {error}"),
            job_id: None,
        }
    }

    fn already_running(job_type: &str) -> Self {
        Self {
            job_type: job_type.to_string(),
            status: SyncStatus::Running,
            total_processed: 0,
            last_offset: 0,
            processed_this_run: 0,
            pages_fetched: 0,
            message: "Another sync of this collection is already running; try again later."
                .to_string(),
            job_id: None,
        }
    }
}

/// Why the loop stopped.
enum Stop {
    Exhausted,
    BudgetSpent,
    Failed(SyncError),
    SlotLost,
}

#[derive(Default)]
struct Progress {
    checkpoint: Checkpoint,
    pages_fetched: u32,
    pages_applied: u32,
    processed_this_run: u64,
}

/// Drives one time-boxed invocation: fetch → upsert → checkpoint, resuming
/// from the last `partial`/`error` row of the same job type.
pub struct SyncDriver<S, E, R> {
    job_type: String,
    source: S,
    store: E,
    jobs: R,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl<S, E, R> SyncDriver<S, E, R>
where
    S: PageSource,
    E: EntityStore<S::Item>,
    R: SyncJobRepository,
{
    pub fn new(
        job_type: &str,
        source: S,
        store: E,
        jobs: R,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            job_type: job_type.to_string(),
            source,
            store,
            jobs,
            clock,
            settings,
        }
    }

    /// Run one invocation. Never fails: errors end up in the summary.
    pub async fn run(&self) -> SyncSummary {
        let job_type = self.job_type.as_str();

        let job = match self
            .jobs
            .acquire_slot(job_type, self.settings.stale_after)
            .await
        {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::info!(job_type, "sync already running, skipping");
                return SyncSummary::already_running(job_type);
            }
            Err(e) => {
                tracing::error!(job_type, error = %e, "could not acquire sync slot");
                return SyncSummary::not_started(job_type, &SyncError::Store(e));
            }
        };

        // The slot row already carries the lineage's resume checkpoint.
        let start = job.checkpoint();
        if start == Checkpoint::default() {
            tracing::info!(job_type, job_id = %job.id, "starting sync from offset 0");
        } else {
            tracing::info!(
                job_type,
                job_id = %job.id,
                offset = start.last_offset,
                total = start.total_processed,
                "resuming sync"
            );
        }

        let mut progress = Progress {
            checkpoint: start,
            ..Progress::default()
        };
        let stop = self.drive(&job, &mut progress).await;
        self.finish(&job, progress, stop).await
    }

    async fn drive(&self, job: &SyncJob, progress: &mut Progress) -> Stop {
        let job_type = self.job_type.as_str();
        let page_size = self.settings.page_size;
        let began = self.clock.now();
        let mut since_checkpoint: u32 = 0;

        loop {
            let elapsed = self.clock.now().saturating_duration_since(began);
            if elapsed >= self.settings.time_budget {
                tracing::info!(
                    job_type,
                    elapsed_ms = elapsed.as_millis() as u64,
                    offset = progress.checkpoint.last_offset,
                    "time budget spent, stopping"
                );
                return Stop::BudgetSpent;
            }

            let offset = progress.checkpoint.last_offset;
            let page = match self.source.fetch_page(offset, page_size).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(job_type, offset, error = %e, "page fetch failed");
                    return Stop::Failed(SyncError::Source(e));
                }
            };
            progress.pages_fetched += 1;

            if page.is_empty() {
                return Stop::Exhausted;
            }

            match upsert_with_policy(
                &self.store,
                &page.items,
                self.settings.batch_policy,
                self.clock.as_ref(),
                self.settings.batch_retry_delay,
            )
            .await
            {
                BatchOutcome::Upserted(n) => {
                    progress.checkpoint.total_processed += n as u64;
                    progress.processed_this_run += n as u64;
                }
                BatchOutcome::Skipped { .. } => {}
                BatchOutcome::Aborted { error } => {
                    return Stop::Failed(SyncError::Upsert(error));
                }
            }

            progress.checkpoint.last_offset = offset + page.raw_len;
            progress.pages_applied += 1;
            tracing::debug!(
                job_type,
                offset = progress.checkpoint.last_offset,
                total = progress.checkpoint.total_processed,
                "page applied"
            );

            since_checkpoint += 1;
            if since_checkpoint >= self.settings.checkpoint_every {
                since_checkpoint = 0;
                match self.jobs.save_checkpoint(job.id, progress.checkpoint).await {
                    Ok(()) => {
                        tracing::debug!(
                            job_type,
                            offset = progress.checkpoint.last_offset,
                            "checkpoint saved"
                        );
                    }
                    Err(IntranetError::Conflict(msg)) => {
                        tracing::error!(job_type, error = %msg, "sync slot taken over, stopping");
                        return Stop::SlotLost;
                    }
                    Err(e) => {
                        tracing::warn!(job_type, error = %e, "checkpoint write failed, continuing");
                    }
                }
            }

            let reached_total = page
                .total_count
                .is_some_and(|total| progress.checkpoint.last_offset >= total);
            if reached_total || page.raw_len < page_size {
                return Stop::Exhausted;
            }

            self.clock.sleep(self.settings.request_delay).await;
        }
    }

    async fn finish(&self, job: &SyncJob, progress: Progress, stop: Stop) -> SyncSummary {
        let job_type = self.job_type.as_str();
        let cp = progress.checkpoint;

        let (status, message, error_message) = match &stop {
            Stop::Exhausted => (
                SyncStatus::Completed,
                format!("Sync completed: {} records saved.", cp.total_processed),
                None,
            ),
            Stop::BudgetSpent | Stop::SlotLost => (
                SyncStatus::Partial,
                format!(
                    "Saved {} records so far (offset {}). Run the sync again to continue from where it stopped.",
                    cp.total_processed, cp.last_offset
                ),
                None,
            ),
            Stop::Failed(e) => {
                let status = if progress.pages_applied > 0 {
                    SyncStatus::Partial
                } else {
                    SyncStatus::Error
                };
                (
                    status,
                    format!(
                        "Sync stopped: {e}. Saved {} records so far (offset {}); running it again will continue from there.",
                        cp.total_processed, cp.last_offset
                    ),
                    Some(e.to_string()),
                )
            }
        };

        let mut summary = SyncSummary {
            job_type: job_type.to_string(),
            status,
            total_processed: cp.total_processed,
            last_offset: cp.last_offset,
            processed_this_run: progress.processed_this_run,
            pages_fetched: progress.pages_fetched,
            message,
            job_id: Some(job.id),
        };

        // After a takeover the row belongs to whoever reclaimed it.
        if matches!(stop, Stop::SlotLost) {
            return summary;
        }

        if let Err(e) = self
            .jobs
            .finish(job.id, status, cp, error_message.as_deref())
            .await
        {
            tracing::error!(job_type, job_id = %job.id, error = %e, "could not record sync result");
            summary
                .message
                .push_str(&format!(" (warning: result not recorded: {e})"));
        }

        match status {
            SyncStatus::Completed => tracing::info!(
                job_type,
                total = cp.total_processed,
                pages = progress.pages_fetched,
                "sync completed"
            ),
            SyncStatus::Partial => tracing::info!(
                job_type,
                total = cp.total_processed,
                offset = cp.last_offset,
                "sync stopped early, resumable"
            ),
            _ => tracing::error!(
                job_type,
                offset = cp.last_offset,
                error = ?error_message,
                "sync failed"
            ),
        }

        summary
    }
}
