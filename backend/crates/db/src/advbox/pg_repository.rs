use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::advbox::models::{dedupe_last_wins, AdvboxCustomer, AdvboxLawsuit};
use crate::advbox::repositories::EntityStore;
use intranet_common::error::{IntranetError, IntranetResult};

/// Postgres caps a statement at 65535 bind parameters; at nine columns per
/// row a batch is split into statements of this many rows.
pub const ROWS_PER_STATEMENT: usize = 5_000;

#[derive(Clone)]
pub struct PgAdvboxRepository {
    pool: PgPool,
}

impl PgAdvboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count_table(&self, table: &str) -> IntranetResult<i64> {
        let row = sqlx::query(&format!("select count(*) as cnt from {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;
        Ok(row.get::<i64, _>("cnt"))
    }
}

#[async_trait]
impl EntityStore<AdvboxCustomer> for PgAdvboxRepository {
    /// Upsert customers in one transaction (idempotent on advbox_id).
    async fn upsert_batch(&self, batch: &[AdvboxCustomer]) -> IntranetResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let rows = dedupe_last_wins(batch);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;
        let mut written = 0;

        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "insert into advbox_customers
                 (advbox_id, name, document, email, phone, city, state, birthdate, raw_ref) ",
            );
            qb.push_values(chunk, |mut b, c| {
                b.push_bind(c.advbox_id)
                    .push_bind(&c.name)
                    .push_bind(&c.document)
                    .push_bind(&c.email)
                    .push_bind(&c.phone)
                    .push_bind(&c.city)
                    .push_bind(&c.state)
                    .push_bind(c.birthdate)
                    .push_bind(&c.raw_ref);
            });
            qb.push(
                " on conflict (advbox_id) do update set
                   name = excluded.name,
                   document = excluded.document,
                   email = excluded.email,
                   phone = excluded.phone,
                   city = excluded.city,
                   state = excluded.state,
                   birthdate = excluded.birthdate,
                   raw_ref = excluded.raw_ref,
                   synced_at = now()",
            );

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| IntranetError::Database(e.to_string()))?;
            written += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;
        Ok(written)
    }

    async fn count(&self) -> IntranetResult<i64> {
        self.count_table("advbox_customers").await
    }
}

#[async_trait]
impl EntityStore<AdvboxLawsuit> for PgAdvboxRepository {
    /// Upsert lawsuits in one transaction (idempotent on advbox_id).
    async fn upsert_batch(&self, batch: &[AdvboxLawsuit]) -> IntranetResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let rows = dedupe_last_wins(batch);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;
        let mut written = 0;

        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "insert into advbox_lawsuits
                 (advbox_id, process_number, protocol_number, customer_ids, stage,
                  type_name, responsible, created_at_advbox, raw_ref) ",
            );
            qb.push_values(chunk, |mut b, l| {
                b.push_bind(l.advbox_id)
                    .push_bind(&l.process_number)
                    .push_bind(&l.protocol_number)
                    .push_bind(&l.customer_ids)
                    .push_bind(&l.stage)
                    .push_bind(&l.type_name)
                    .push_bind(&l.responsible)
                    .push_bind(l.created_at_advbox)
                    .push_bind(&l.raw_ref);
            });
            qb.push(
                " on conflict (advbox_id) do update set
                   process_number = excluded.process_number,
                   protocol_number = excluded.protocol_number,
                   customer_ids = excluded.customer_ids,
                   stage = excluded.stage,
                   type_name = excluded.type_name,
                   responsible = excluded.responsible,
                   created_at_advbox = excluded.created_at_advbox,
                   raw_ref = excluded.raw_ref,
                   synced_at = now()",
            );

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| IntranetError::Database(e.to_string()))?;
            written += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .map_err(|e| IntranetError::Database(e.to_string()))?;
        Ok(written)
    }

    async fn count(&self) -> IntranetResult<i64> {
        self.count_table("advbox_lawsuits").await
    }
}
