use reqwest::StatusCode;

use intranet_common::error::IntranetError;

/// Failures of one page fetch. Everything except `RateLimited` is an
/// upstream error: not retried within the current iteration.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited by upstream (HTTP 429)")]
    RateLimited,

    #[error("upstream HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned an invalid body: {0}")]
    InvalidBody(String),

    #[error("still rate limited after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited)
    }
}

/// Why a run stopped short of completion. Never escapes
/// [`crate::driver::SyncDriver::run`]; it ends up in the summary message.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("batch upsert failed: {0}")]
    Upsert(IntranetError),

    #[error("sync state store: {0}")]
    Store(IntranetError),
}
