use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a running intranet service, served on `/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    /// `version` is the caller's `CARGO_PKG_VERSION`, not this crate's.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}
