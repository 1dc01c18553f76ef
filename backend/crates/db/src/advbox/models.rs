use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A row mirrored from an upstream collection, keyed by the upstream's ID.
pub trait ExternalEntity: Clone + Send + Sync + 'static {
    fn external_id(&self) -> i64;
    fn set_synced_at(&mut self, at: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvboxCustomer {
    pub advbox_id: i64,
    pub name: String,
    pub document: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub raw_ref: Option<serde_json::Value>,
    /// Set by the store on write; observability only.
    pub synced_at: Option<DateTime<Utc>>,
}

impl ExternalEntity for AdvboxCustomer {
    fn external_id(&self) -> i64 {
        self.advbox_id
    }

    fn set_synced_at(&mut self, at: DateTime<Utc>) {
        self.synced_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvboxLawsuit {
    pub advbox_id: i64,
    pub process_number: Option<String>,
    pub protocol_number: Option<String>,
    pub customer_ids: Vec<i64>,
    pub stage: Option<String>,
    pub type_name: Option<String>,
    pub responsible: Option<String>,
    pub created_at_advbox: Option<DateTime<Utc>>,
    pub raw_ref: Option<serde_json::Value>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl ExternalEntity for AdvboxLawsuit {
    fn external_id(&self) -> i64 {
        self.advbox_id
    }

    fn set_synced_at(&mut self, at: DateTime<Utc>) {
        self.synced_at = Some(at);
    }
}

/// Collapse rows sharing an external ID, keeping the last occurrence.
///
/// Postgres rejects an `on conflict do update` that touches the same row twice.
pub fn dedupe_last_wins<T: ExternalEntity>(batch: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(batch.len());
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(batch.len());
    for entity in batch {
        match index.entry(entity.external_id()) {
            Entry::Occupied(slot) => out[*slot.get()] = entity.clone(),
            Entry::Vacant(slot) => {
                slot.insert(out.len());
                out.push(entity.clone());
            }
        }
    }
    out
}
