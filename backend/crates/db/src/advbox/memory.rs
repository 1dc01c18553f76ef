use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::advbox::models::{dedupe_last_wins, ExternalEntity};
use crate::advbox::repositories::EntityStore;
use intranet_common::error::{IntranetError, IntranetResult};

/// In-process [`EntityStore`] keyed by external ID. Clones share state.
///
/// `fail_next_batches` makes the next N `upsert_batch` calls fail, for
/// exercising batch failure policies.
pub struct MemoryEntityStore<T> {
    rows: Arc<Mutex<BTreeMap<i64, T>>>,
    failures_left: Arc<AtomicUsize>,
    batch_calls: Arc<AtomicUsize>,
}

impl<T> Clone for MemoryEntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            failures_left: Arc::clone(&self.failures_left),
            batch_calls: Arc::clone(&self.batch_calls),
        }
    }
}

impl<T> Default for MemoryEntityStore<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
            failures_left: Arc::new(AtomicUsize::new(0)),
            batch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<T: ExternalEntity> MemoryEntityStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_batches(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of `upsert_batch` calls, failed ones included.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, external_id: i64) -> Option<T> {
        self.rows
            .lock()
            .ok()
            .and_then(|rows| rows.get(&external_id).cloned())
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows
            .lock()
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<T: ExternalEntity> EntityStore<T> for MemoryEntityStore<T> {
    async fn upsert_batch(&self, batch: &[T]) -> IntranetResult<usize> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(IntranetError::Database(
                "simulated batch failure".to_string(),
            ));
        }

        let now = Utc::now();
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| IntranetError::Internal("entity store poisoned".to_string()))?;
        let deduped = dedupe_last_wins(batch);
        for mut entity in deduped.iter().cloned() {
            entity.set_synced_at(now);
            rows.insert(entity.external_id(), entity);
        }
        Ok(deduped.len())
    }

    async fn count(&self) -> IntranetResult<i64> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| IntranetError::Internal("entity store poisoned".to_string()))?;
        Ok(rows.len() as i64)
    }
}
