use std::time::Duration;

use async_trait::async_trait;

use intranet_db::advbox::models::ExternalEntity;

use crate::error::SourceError;

/// One page of an upstream collection.
///
/// `raw_len` is how many records the upstream returned, which is what the
/// offset advances by even when some records could not be converted.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub raw_len: u64,
    pub total_count: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: Option<u64>) -> Self {
        Self {
            raw_len: items.len() as u64,
            items,
            total_count,
        }
    }

    /// Convert items, dropping those `f` rejects, keeping `raw_len`.
    pub fn filter_map<U>(self, f: impl FnMut(T) -> Option<U>) -> Page<U> {
        Page {
            items: self.items.into_iter().filter_map(f).collect(),
            raw_len: self.raw_len,
            total_count: self.total_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_len == 0
    }
}

/// Offset-paginated upstream collection. Implementations apply their own
/// retry policy; an `Err` here is final for the current iteration.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: ExternalEntity;

    async fn fetch_page(&self, offset: u64, limit: u64)
        -> Result<Page<Self::Item>, SourceError>;
}

/// Exponential backoff without jitter: the n-th retry waits `2^n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Wait before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of the waits for `retries` consecutive retries.
    pub fn total_delay(&self, retries: u32) -> Duration {
        (0..retries).fold(Duration::ZERO, |acc, i| {
            acc.saturating_add(self.delay_for(i))
        })
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(2000))
    }
}
