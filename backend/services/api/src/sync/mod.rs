pub mod handlers;
pub mod requests;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/{job_type}", post(handlers::run_sync))
        .route("/sync/{job_type}/status", get(handlers::latest_job))
        .route("/sync/{job_type}/history", get(handlers::job_history))
}
