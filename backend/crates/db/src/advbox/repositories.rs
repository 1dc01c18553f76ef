use async_trait::async_trait;

use intranet_common::error::IntranetResult;

use crate::advbox::models::ExternalEntity;

/// Upsert target for mirrored entities.
#[async_trait]
pub trait EntityStore<T: ExternalEntity>: Send + Sync {
    /// Insert or overwrite every row of `batch` keyed by its external ID.
    /// The batch is applied atomically; returns the number of rows written.
    async fn upsert_batch(&self, batch: &[T]) -> IntranetResult<usize>;

    async fn count(&self) -> IntranetResult<i64>;
}

#[async_trait]
impl<T: ExternalEntity, S: EntityStore<T> + ?Sized> EntityStore<T> for std::sync::Arc<S> {
    async fn upsert_batch(&self, batch: &[T]) -> IntranetResult<usize> {
        (**self).upsert_batch(batch).await
    }

    async fn count(&self) -> IntranetResult<i64> {
        (**self).count().await
    }
}
