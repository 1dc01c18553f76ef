use intranet_db::sync::models::SyncJob;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SyncJobResponse {
    pub data: SyncJob,
}

#[derive(Debug, Serialize)]
pub struct SyncHistoryResponse {
    pub data: Vec<SyncJob>,
    pub count: usize,
}
