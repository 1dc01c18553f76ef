use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use intranet_common::error::IntranetError;

/// Upstream collections mirrored by the sync worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Customers,
    Lawsuits,
}

impl JobType {
    pub const ALL: [JobType; 2] = [JobType::Customers, JobType::Lawsuits];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Customers => "customers",
            JobType::Lawsuits => "lawsuits",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = IntranetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customers" => Ok(JobType::Customers),
            "lawsuits" => Ok(JobType::Lawsuits),
            other => Err(IntranetError::Validation(format!(
                "unknown job type '{other}', expected one of: customers, lawsuits"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(" Customers ".parse::<JobType>().unwrap(), JobType::Customers);
        assert_eq!("lawsuits".parse::<JobType>().unwrap(), JobType::Lawsuits);
    }

    #[test]
    fn unknown_job_type_lists_valid_ones() {
        let err = "payments".parse::<JobType>().unwrap_err();
        assert!(err.to_string().contains("customers, lawsuits"));
    }
}
