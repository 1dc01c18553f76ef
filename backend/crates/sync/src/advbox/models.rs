use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Envelope of every Advbox list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(
        default,
        rename = "totalCount",
        alias = "total_count",
        alias = "total",
        deserialize_with = "lenient_u64"
    )]
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCustomer {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "document", alias = "cpf_cnpj")]
    pub identification: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "cellphone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
}

impl ApiCustomer {
    /// Advbox sends dates as `YYYY-MM-DD` or `DD/MM/YYYY`; anything else is dropped.
    pub fn birthdate(&self) -> Option<NaiveDate> {
        let raw = self.birthdate.as_deref()?.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
            .ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLawsuitCustomer {
    #[serde(alias = "id", deserialize_with = "lenient_id")]
    pub customer_id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLawsuit {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default)]
    pub process_number: Option<String>,
    #[serde(default)]
    pub protocol_number: Option<String>,
    #[serde(default)]
    pub customers: Vec<ApiLawsuitCustomer>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ApiLawsuit {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
            })
            .ok()
    }
}

/// IDs arrive as numbers or numeric strings depending on the endpoint.
fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Int(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }
    match Option::<Raw>::deserialize(d)? {
        Some(Raw::Int(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) => Ok(s.trim().parse().ok()),
        None => Ok(None),
    }
}
