use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use intranet_common::error::IntranetError;

/// Lifecycle state of one sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Partial,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Partial => "partial",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    /// Whether a later invocation should pick up from this row's offset.
    pub fn is_resumable(&self) -> bool {
        matches!(self, SyncStatus::Partial | SyncStatus::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = IntranetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SyncStatus::Running),
            "partial" => Ok(SyncStatus::Partial),
            "completed" => Ok(SyncStatus::Completed),
            "error" => Ok(SyncStatus::Error),
            other => Err(IntranetError::Validation(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

/// Resume position of a lineage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_offset: u64,
    pub total_processed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub job_type: String,
    pub status: SyncStatus,
    pub last_offset: u64,
    pub total_processed: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    /// A fresh `running` row for `job_type`.
    pub fn start(job_type: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            status: SyncStatus::Running,
            last_offset: 0,
            total_processed: 0,
            started_at: now,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            last_offset: self.last_offset,
            total_processed: self.total_processed,
        }
    }
}
