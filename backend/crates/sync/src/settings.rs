use std::time::Duration;

use intranet_common::error::{IntranetError, IntranetResult};
use intranet_config::{get_var_or, parse_var_or};

use crate::sink::BatchPolicy;

/// Largest page the sync asks for; bigger pages only lengthen each upsert.
pub const MAX_PAGE_SIZE: u64 = 1_000;

/// Tuning of one sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub page_size: u64,
    /// Wall-clock ceiling, checked before every page.
    pub time_budget: Duration,
    /// Pause between successful page fetches.
    pub request_delay: Duration,
    /// Persist the checkpoint every N pages.
    pub checkpoint_every: u32,
    pub batch_policy: BatchPolicy,
    pub batch_retry_delay: Duration,
    /// A `running` row idle for longer than this is treated as abandoned.
    pub stale_after: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            time_budget: Duration::from_millis(50_000),
            request_delay: Duration::from_millis(500),
            checkpoint_every: 5,
            batch_policy: BatchPolicy::SkipAndContinue,
            batch_retry_delay: Duration::from_millis(1000),
            stale_after: Duration::from_secs(600),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> IntranetResult<Self> {
        let defaults = Self::default();
        let settings = Self {
            page_size: parse_var_or("SYNC_PAGE_SIZE", defaults.page_size)?,
            time_budget: Duration::from_millis(parse_var_or(
                "SYNC_TIME_BUDGET_MS",
                defaults.time_budget.as_millis() as u64,
            )?),
            request_delay: Duration::from_millis(parse_var_or(
                "SYNC_REQUEST_DELAY_MS",
                defaults.request_delay.as_millis() as u64,
            )?),
            checkpoint_every: parse_var_or("SYNC_CHECKPOINT_EVERY", defaults.checkpoint_every)?,
            batch_policy: get_var_or("SYNC_BATCH_POLICY", "skip").parse()?,
            batch_retry_delay: Duration::from_millis(parse_var_or(
                "SYNC_BATCH_RETRY_DELAY_MS",
                defaults.batch_retry_delay.as_millis() as u64,
            )?),
            stale_after: Duration::from_secs(parse_var_or(
                "SYNC_STALE_AFTER_SECS",
                defaults.stale_after.as_secs(),
            )?),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> IntranetResult<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(IntranetError::Config(format!(
                "SYNC_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.checkpoint_every == 0 {
            return Err(IntranetError::Config(
                "SYNC_CHECKPOINT_EVERY must be at least 1".to_string(),
            ));
        }
        if self.stale_after <= self.time_budget {
            return Err(IntranetError::Config(
                "SYNC_STALE_AFTER_SECS must exceed the time budget".to_string(),
            ));
        }
        Ok(())
    }

    /// Longest a live invocation can go without touching its row: the whole
    /// budget, then one more page whose fetch takes `worst_fetch`, plus the
    /// batch retries and the pause that follow it.
    pub fn longest_silence(&self, worst_fetch: Duration) -> Duration {
        let batch_retries = match self.batch_policy {
            BatchPolicy::RetryBatch(n) => self.batch_retry_delay.saturating_mul(n),
            _ => Duration::ZERO,
        };
        self.time_budget
            .saturating_add(worst_fetch)
            .saturating_add(batch_retries)
            .saturating_add(self.request_delay)
    }

    /// Reject a stale window short enough to reclaim a live invocation.
    pub fn check_stale_window(&self, worst_fetch: Duration) -> IntranetResult<()> {
        let needed = self.longest_silence(worst_fetch);
        if self.stale_after <= needed {
            return Err(IntranetError::Config(format!(
                "SYNC_STALE_AFTER_SECS ({}s) must exceed the longest a running sync can stay \
                 silent ({}s: time budget plus one worst-case page fetch)",
                self.stale_after.as_secs(),
                needed.as_secs_f64().ceil() as u64
            )));
        }
        Ok(())
    }
}
