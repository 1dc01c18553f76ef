use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use intranet_common::error::IntranetError;
use intranet_db::advbox::models::ExternalEntity;
use intranet_db::advbox::repositories::EntityStore;

use crate::clock::Clock;

/// What to do when a whole batch upsert fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchPolicy {
    /// Log it and move the offset past the batch anyway.
    #[default]
    SkipAndContinue,
    /// Retry up to n more times, then skip.
    RetryBatch(u32),
    /// Stop the run; the checkpoint stays before the failed batch.
    AbortJob,
}

impl fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPolicy::SkipAndContinue => f.write_str("skip"),
            BatchPolicy::RetryBatch(n) => write!(f, "retry:{n}"),
            BatchPolicy::AbortJob => f.write_str("abort"),
        }
    }
}

impl FromStr for BatchPolicy {
    type Err = IntranetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "skip" => Ok(BatchPolicy::SkipAndContinue),
            "abort" => Ok(BatchPolicy::AbortJob),
            _ => s
                .strip_prefix("retry:")
                .and_then(|n| n.parse().ok())
                .map(BatchPolicy::RetryBatch)
                .ok_or_else(|| {
                    IntranetError::Config(format!(
                        "invalid batch policy '{s}', expected skip, retry:<n> or abort"
                    ))
                }),
        }
    }
}

#[derive(Debug)]
pub enum BatchOutcome {
    Upserted(usize),
    Skipped { error: IntranetError },
    Aborted { error: IntranetError },
}

/// Apply one page to `store` under `policy`.
pub async fn upsert_with_policy<T, E>(
    store: &E,
    batch: &[T],
    policy: BatchPolicy,
    clock: &dyn Clock,
    retry_delay: Duration,
) -> BatchOutcome
where
    T: ExternalEntity,
    E: EntityStore<T> + ?Sized,
{
    if batch.is_empty() {
        return BatchOutcome::Upserted(0);
    }

    let extra_attempts = match policy {
        BatchPolicy::RetryBatch(n) => n,
        _ => 0,
    };

    let mut attempt = 0;
    let error = loop {
        match store.upsert_batch(batch).await {
            Ok(n) => return BatchOutcome::Upserted(n),
            Err(e) if attempt < extra_attempts => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max = extra_attempts,
                    error = %e,
                    "batch upsert failed, retrying"
                );
                clock.sleep(retry_delay).await;
            }
            Err(e) => break e,
        }
    };

    match policy {
        BatchPolicy::AbortJob => {
            tracing::error!(size = batch.len(), error = %error, "batch upsert failed, aborting run");
            BatchOutcome::Aborted { error }
        }
        _ => {
            tracing::warn!(
                size = batch.len(),
                error = %error,
                "batch upsert failed, skipping batch"
            );
            BatchOutcome::Skipped { error }
        }
    }
}
