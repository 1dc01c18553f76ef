use async_trait::async_trait;

use intranet_db::advbox::models::{AdvboxCustomer, AdvboxLawsuit};

use super::client::AdvboxClient;
use super::models::{ApiCustomer, ApiLawsuit};
use crate::error::SourceError;
use crate::source::{Page, PageSource};

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Convert an API customer to a DB row; `raw` is kept verbatim in `raw_ref`.
pub fn customer_from_api(raw: serde_json::Value) -> Option<AdvboxCustomer> {
    let api: ApiCustomer = match serde_json::from_value(raw.clone()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "skipping advbox customer without a usable id/name");
            return None;
        }
    };
    let birthdate = api.birthdate();

    Some(AdvboxCustomer {
        advbox_id: api.id,
        name: api.name.trim().to_string(),
        document: blank_to_none(api.identification),
        email: blank_to_none(api.email),
        phone: blank_to_none(api.phone),
        city: blank_to_none(api.city),
        state: blank_to_none(api.state),
        birthdate,
        raw_ref: Some(raw),
        synced_at: None,
    })
}

pub fn lawsuit_from_api(raw: serde_json::Value) -> Option<AdvboxLawsuit> {
    let api: ApiLawsuit = match serde_json::from_value(raw.clone()) {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(error = %e, "skipping advbox lawsuit without a usable id");
            return None;
        }
    };
    let created_at_advbox = api.created_at();

    Some(AdvboxLawsuit {
        advbox_id: api.id,
        process_number: blank_to_none(api.process_number),
        protocol_number: blank_to_none(api.protocol_number),
        customer_ids: api.customers.iter().map(|c| c.customer_id).collect(),
        stage: blank_to_none(api.stage),
        type_name: blank_to_none(api.type_name),
        responsible: blank_to_none(api.responsible),
        created_at_advbox,
        raw_ref: Some(raw),
        synced_at: None,
    })
}

pub struct CustomerSource {
    client: AdvboxClient,
}

impl CustomerSource {
    pub fn new(client: AdvboxClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource for CustomerSource {
    type Item = AdvboxCustomer;

    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page<AdvboxCustomer>, SourceError> {
        let page = self.client.get_page("customers", offset, limit).await?;
        Ok(page.filter_map(customer_from_api))
    }
}

pub struct LawsuitSource {
    client: AdvboxClient,
}

impl LawsuitSource {
    pub fn new(client: AdvboxClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource for LawsuitSource {
    type Item = AdvboxLawsuit;

    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page<AdvboxLawsuit>, SourceError> {
        let page = self.client.get_page("lawsuits", offset, limit).await?;
        Ok(page.filter_map(lawsuit_from_api))
    }
}
