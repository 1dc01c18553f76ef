use axum::extract::{Path, Query, State};
use axum::Json;
use intranet_common::error::IntranetError;
use intranet_db::sync::repositories::SyncJobRepository;
use intranet_sync::{run_job, JobType, SyncSummary};

use crate::error::ApiError;
use crate::sync::requests::{HistoryQuery, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::sync::responses::{SyncHistoryResponse, SyncJobResponse};
use crate::AppState;

fn validate_limit(limit: Option<i64>) -> Result<i64, IntranetError> {
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(IntranetError::Validation(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }
    Ok(limit)
}

/// Runs one time-boxed invocation. Every outcome, including a configuration
/// error, comes back as a summary with 200.
pub async fn run_sync(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
) -> Result<Json<SyncSummary>, ApiError> {
    let job: JobType = job_type.parse()?;
    let summary = run_job(job, &state.advbox, &state.ctx).await;
    Ok(Json(summary))
}

pub async fn latest_job(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
) -> Result<Json<SyncJobResponse>, ApiError> {
    let job: JobType = job_type.parse()?;
    let row = state
        .ctx
        .jobs
        .latest(job.as_str())
        .await?
        .ok_or_else(|| IntranetError::NotFound(format!("no {job} sync has run yet")))?;

    Ok(Json(SyncJobResponse { data: row }))
}

pub async fn job_history(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<SyncHistoryResponse>, ApiError> {
    let job: JobType = job_type.parse()?;
    let limit = validate_limit(query.limit)?;
    let data = state.ctx.jobs.list_recent(job.as_str(), limit).await?;
    let count = data.len();
    Ok(Json(SyncHistoryResponse { data, count }))
}
