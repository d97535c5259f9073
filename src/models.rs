//! Data models for hotspot hosts and managed devices

use serde::{Deserialize, Serialize};

/// Host record as reported by `show ip hotspot` (active) or `ip hotspot`
/// (configured)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HotspotHost {
    pub mac: Option<String>,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub active: Option<bool>,
    pub registered: Option<bool>,
    pub policy: Option<String>,
}

/// Merged view of one LAN client, keyed by lower-case MAC
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub mac: String,
    pub name: String,
    pub ip: String,
    pub hostname: String,
    pub active: bool,
    pub registered: bool,
    pub vpn_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl Device {
    /// Name shown to users, falling back to the MAC
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.mac
        } else {
            &self.name
        }
    }
}

/// `success`: the router accepted the change. `verified`: a read-back shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VpnToggleResult {
    pub success: bool,
    pub verified: bool,
}
