use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::sync::models::{Checkpoint, SyncJob, SyncStatus};
use crate::sync::repositories::SyncJobRepository;
use intranet_common::error::{IntranetError, IntranetResult};

const COLUMNS: &str = "id, job_type, status, last_offset, total_processed, started_at, \
                       completed_at, error_message, created_at, updated_at";

#[derive(Clone)]
pub struct PgSyncJobRepository {
    pool: PgPool,
}

impl PgSyncJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> IntranetResult<SyncJob> {
        let status: String = row.get("status");
        let last_offset: i64 = row.get("last_offset");
        let total_processed: i64 = row.get("total_processed");
        Ok(SyncJob {
            id: row.get("id"),
            job_type: row.get("job_type"),
            status: status.parse()?,
            last_offset: last_offset.max(0) as u64,
            total_processed: total_processed.max(0) as u64,
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

fn to_db_int(value: u64) -> IntranetResult<i64> {
    i64::try_from(value)
        .map_err(|_| IntranetError::Validation(format!("value {value} does not fit in bigint")))
}

#[async_trait]
impl SyncJobRepository for PgSyncJobRepository {
    async fn acquire_slot(
        &self,
        job_type: &str,
        stale_after: Duration,
    ) -> IntranetResult<Option<SyncJob>> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .map_err(|e| IntranetError::Validation(format!("invalid stale_after: {e}")))?;
        let cutoff = Utc::now() - stale_after;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;

        let reclaimed = sqlx::query(
            "update sync_jobs
             set status = 'partial',
                 completed_at = now(),
                 error_message = 'invocation stopped reporting progress; resumable',
                 updated_at = now()
             where job_type = $1 and status = 'running' and updated_at < $2",
        )
        .bind(job_type)
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(|e| IntranetError::Database(e.to_string()))?
        .rows_affected();

        if reclaimed > 0 {
            tracing::warn!(job_type, reclaimed, "reclaimed stale running sync job");
        }

        // The new row starts at the lineage's resume point, so even a crash
        // before the first checkpoint leaves a row that resumes from there.
        let query = format!(
            "with latest as (
                 select status, last_offset, total_processed from sync_jobs
                 where job_type = $2 and status != 'running'
                 order by created_at desc
                 limit 1
             ), resume as (
                 select last_offset, total_processed from latest
                 where status in ('partial', 'error')
             )
             insert into sync_jobs (id, job_type, status, last_offset, total_processed, started_at)
             select $1, $2, 'running',
                    coalesce((select last_offset from resume), 0),
                    coalesce((select total_processed from resume), 0),
                    now()
             on conflict (job_type) where status = 'running' do nothing
             returning {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(job_type)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::map_row(r)?)),
            None => Ok(None),
        }
    }

    async fn find_resume_point(&self, job_type: &str) -> IntranetResult<Option<SyncJob>> {
        let query = format!(
            "select {COLUMNS} from sync_jobs
             where job_type = $1 and status != 'running'
             order by created_at desc
             limit 1"
        );
        let row = sqlx::query(&query)
            .bind(job_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;

        match row {
            Some(r) => {
                let job = Self::map_row(r)?;
                Ok(job.status.is_resumable().then_some(job))
            }
            None => Ok(None),
        }
    }

    async fn save_checkpoint(&self, id: Uuid, checkpoint: Checkpoint) -> IntranetResult<()> {
        let result = sqlx::query(
            "update sync_jobs
             set last_offset = greatest(last_offset, $1),
                 total_processed = $2,
                 updated_at = now()
             where id = $3 and status = 'running'",
        )
        .bind(to_db_int(checkpoint.last_offset)?)
        .bind(to_db_int(checkpoint.total_processed)?)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| IntranetError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(IntranetError::Conflict(format!(
                "sync job {id} is no longer running"
            )));
        }
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: SyncStatus,
        checkpoint: Checkpoint,
        error_message: Option<&str>,
    ) -> IntranetResult<SyncJob> {
        let query = format!(
            "update sync_jobs
             set status = $1,
                 last_offset = greatest(last_offset, $2),
                 total_processed = $3,
                 error_message = $4,
                 completed_at = now(),
                 updated_at = now()
             where id = $5
             returning {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(status.as_str())
            .bind(to_db_int(checkpoint.last_offset)?)
            .bind(to_db_int(checkpoint.total_processed)?)
            .bind(error_message)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?
            .ok_or_else(|| IntranetError::NotFound(format!("sync job {id}")))?;

        Self::map_row(row)
    }

    async fn latest(&self, job_type: &str) -> IntranetResult<Option<SyncJob>> {
        let query = format!(
            "select {COLUMNS} from sync_jobs
             where job_type = $1
             order by created_at desc
             limit 1"
        );
        let row = sqlx::query(&query)
            .bind(job_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn list_recent(&self, job_type: &str, limit: i64) -> IntranetResult<Vec<SyncJob>> {
        let query = format!(
            "select {COLUMNS} from sync_jobs
             where job_type = $1
             order by created_at desc
             limit $2"
        );
        let rows = sqlx::query(&query)
            .bind(job_type)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn test_repo() -> Option<PgSyncJobRepository> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");
        run_migrations(&pool).await.ok()?;
        Some(PgSyncJobRepository::new(pool))
    }

    // Each test uses its own job type so runs do not interfere.
    fn unique_job_type() -> String {
        format!("test-{}", Uuid::new_v4())
    }

    const STALE: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn acquire_slot_inserts_running_row() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        let job = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("acquire")
            .expect("slot should be free");
        assert_eq!(job.status, SyncStatus::Running);
        assert_eq!(job.job_type, job_type);
        assert_eq!(job.last_offset, 0);
    }

    #[tokio::test]
    async fn second_acquire_is_refused_while_running() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        repo.acquire_slot(&job_type, STALE).await.expect("first");
        let second = repo.acquire_slot(&job_type, STALE).await.expect("second");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn stale_running_row_is_reclaimed_as_partial() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        let first = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("first")
            .expect("slot");
        repo.save_checkpoint(
            first.id,
            Checkpoint {
                last_offset: 300,
                total_processed: 300,
            },
        )
        .await
        .expect("checkpoint");

        let second = repo
            .acquire_slot(&job_type, Duration::ZERO)
            .await
            .expect("second");
        assert!(second.is_some());

        let resume = repo
            .find_resume_point(&job_type)
            .await
            .expect("resume")
            .expect("stale row should be resumable");
        assert_eq!(resume.id, first.id);
        assert_eq!(resume.status, SyncStatus::Partial);
        assert_eq!(resume.last_offset, 300);
    }

    #[tokio::test]
    async fn finish_releases_slot_and_sets_resume_point() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        let job = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("acquire")
            .expect("slot");
        let finished = repo
            .finish(
                job.id,
                SyncStatus::Partial,
                Checkpoint {
                    last_offset: 200,
                    total_processed: 200,
                },
                None,
            )
            .await
            .expect("finish");
        assert_eq!(finished.status, SyncStatus::Partial);
        assert!(finished.completed_at.is_some());

        let resume = repo
            .find_resume_point(&job_type)
            .await
            .expect("resume")
            .expect("partial row");
        assert_eq!(resume.last_offset, 200);

        assert!(repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("reacquire")
            .is_some());
    }

    #[tokio::test]
    async fn acquire_slot_starts_at_resume_point() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        let first = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("acquire")
            .expect("slot");
        let cp = Checkpoint {
            last_offset: 700,
            total_processed: 690,
        };
        repo.finish(first.id, SyncStatus::Error, cp, Some("upstream down"))
            .await
            .expect("finish");

        let second = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("reacquire")
            .expect("slot");
        assert_eq!(second.checkpoint(), cp);
    }

    #[tokio::test]
    async fn abandoned_row_keeps_carried_offset() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        let first = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("acquire")
            .expect("slot");
        let cp = Checkpoint {
            last_offset: 700,
            total_processed: 700,
        };
        repo.finish(first.id, SyncStatus::Partial, cp, None)
            .await
            .expect("finish");

        // Acquired, then abandoned before any checkpoint.
        repo.acquire_slot(&job_type, STALE)
            .await
            .expect("acquire")
            .expect("slot");
        let third = repo
            .acquire_slot(&job_type, Duration::ZERO)
            .await
            .expect("reclaim")
            .expect("slot");
        assert_eq!(third.checkpoint(), cp);
    }

    #[tokio::test]
    async fn completed_run_clears_resume_point() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        let job = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("acquire")
            .expect("slot");
        repo.finish(
            job.id,
            SyncStatus::Completed,
            Checkpoint {
                last_offset: 250,
                total_processed: 250,
            },
            None,
        )
        .await
        .expect("finish");
        assert!(repo
            .find_resume_point(&job_type)
            .await
            .expect("resume")
            .is_none());
        let fresh = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("reacquire")
            .expect("slot");
        assert_eq!(fresh.checkpoint(), Checkpoint::default());
    }

    #[tokio::test]
    async fn checkpoint_never_moves_offset_backwards() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        let job = repo
            .acquire_slot(&job_type, STALE)
            .await
            .expect("acquire")
            .expect("slot");
        repo.save_checkpoint(
            job.id,
            Checkpoint {
                last_offset: 500,
                total_processed: 500,
            },
        )
        .await
        .expect("forward");
        repo.save_checkpoint(
            job.id,
            Checkpoint {
                last_offset: 100,
                total_processed: 500,
            },
        )
        .await
        .expect("backward");
        let latest = repo.latest(&job_type).await.expect("latest").expect("row");
        assert_eq!(latest.last_offset, 500);
    }

    #[tokio::test]
    async fn list_recent_orders_newest_first() {
        let Some(repo) = test_repo().await else {
            return;
        };
        let job_type = unique_job_type();
        for _ in 0..3 {
            let job = repo
                .acquire_slot(&job_type, STALE)
                .await
                .expect("acquire")
                .expect("slot");
            repo.finish(job.id, SyncStatus::Completed, Checkpoint::default(), None)
                .await
                .expect("finish");
        }
        let rows = repo.list_recent(&job_type, 2).await.expect("list");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].created_at >= rows[1].created_at);
    }
}
