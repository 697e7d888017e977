//! Bridge status reporting.

use serde::{Deserialize, Serialize};
use zenoh::Session;

use crate::error::Result;

/// Bridge status published on `{prefix}/@/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name.
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running" or "offline").
    pub status: String,
    /// Entity names served by the bridge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
    /// Hub names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hubs: Vec<String>,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(entities: Vec<String>, hubs: Vec<String>) -> Self {
        Self {
            bridge: "modbus".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "running".to_string(),
            entities,
            hubs,
        }
    }

    /// Create a status with "offline" state.
    pub fn offline() -> Self {
        Self {
            bridge: "modbus".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "offline".to_string(),
            entities: Vec::new(),
            hubs: Vec::new(),
        }
    }

    /// Publish this status to `{key_prefix}/@/status`.
    pub async fn publish(&self, session: &Session, key_prefix: &str) -> Result<()> {
        let key = format!("{}/@/status", key_prefix);
        let payload = serde_json::to_string(self)?;
        session.put(&key, payload).await?;
        Ok(())
    }
}
