//! Device-level operations on top of the RCI
//!
//! Merges the router's runtime host table with its configured host table,
//! builds the policy change commands and reads them back for verification.

use crate::error::{RciError, Result};
use crate::models::{Device, HotspotHost, VpnToggleResult};
use crate::parser::{normalize_mac, parse_hosts};
use crate::rci::Rci;
use icu_collator::{Collator, CollatorOptions};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub const ACTIVE_HOSTS_PATH: &str = "/rci/show/ip/hotspot";
pub const CONFIGURED_HOSTS_PATH: &str = "/rci/ip/hotspot";
pub const COMMAND_PATH: &str = "/rci/";
pub const VERSION_PATH: &str = "/rci/show/version";

#[derive(Clone)]
pub struct DeviceService {
    rci: Arc<dyn Rci>,
    vpn_policy: String,
}

impl DeviceService {
    pub fn new(rci: Arc<dyn Rci>, vpn_policy: impl Into<String>) -> Self {
        Self {
            rci,
            vpn_policy: vpn_policy.into(),
        }
    }

    pub fn vpn_policy(&self) -> &str {
        &self.vpn_policy
    }

    /// Merged device list, active devices first
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let (active, configured) = tokio::try_join!(
            self.fetch_hosts(ACTIVE_HOSTS_PATH),
            self.fetch_hosts(CONFIGURED_HOSTS_PATH)
        )?;

        let devices = merge_hosts(&active, &configured, &self.vpn_policy);
        tracing::debug!(
            "Merged {} active and {} configured hosts into {} devices",
            active.len(),
            configured.len(),
            devices.len()
        );
        Ok(devices)
    }

    /// Attach or detach the VPN policy, then read the configuration back
    pub async fn set_device_vpn(&self, mac: &str, enabled: bool) -> Result<VpnToggleResult> {
        let mac = mac.to_lowercase();
        let payload = if enabled {
            vpn_on_payload(&mac, &self.vpn_policy)
        } else {
            vpn_off_payload(&mac)
        };

        tracing::info!(
            "Setting VPN {} for {}",
            if enabled { "on" } else { "off" },
            mac
        );
        self.rci.post(COMMAND_PATH, &payload).await?;

        let verified = self.verify_policy(&mac, enabled).await?;
        if !verified {
            tracing::warn!("Policy change for {} accepted but not reflected yet", mac);
        }

        Ok(VpnToggleResult {
            success: true,
            verified,
        })
    }

    /// `true` when an authenticated read succeeds
    pub async fn check_health(&self) -> bool {
        match self.rci.get(VERSION_PATH).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                false
            }
        }
    }

    async fn verify_policy(&self, mac: &str, enabled: bool) -> Result<bool> {
        let hosts = self.fetch_hosts(CONFIGURED_HOSTS_PATH).await?;
        let host = hosts
            .iter()
            .rev()
            .find(|host| normalize_mac(host.mac.as_deref()).as_deref() == Some(mac));

        Ok(host.is_some_and(|host| policy_matches(host, enabled, &self.vpn_policy)))
    }

    async fn fetch_hosts(&self, path: &str) -> Result<Vec<HotspotHost>> {
        let value = self.rci.get(path).await?;
        parse_hosts(value).map_err(|source| RciError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// Join active and configured hosts on their MAC.
///
/// Hosts without a usable MAC are dropped. When the configured table lists a
/// MAC twice the later record wins.
pub fn merge_hosts(
    active: &[HotspotHost],
    configured: &[HotspotHost],
    vpn_policy: &str,
) -> Vec<Device> {
    let mut config_by_mac: HashMap<String, &HotspotHost> = HashMap::new();
    for host in configured {
        if let Some(mac) = normalize_mac(host.mac.as_deref()) {
            config_by_mac.insert(mac, host);
        }
    }

    let mut devices: Vec<Device> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for host in active {
        let Some(mac) = normalize_mac(host.mac.as_deref()) else {
            continue;
        };
        let config = config_by_mac.get(&mac).copied();
        // The runtime table's policy is not the persisted assignment
        let policy = config.and_then(|c| c.policy.clone());

        let device = Device {
            name: first_non_empty(&[
                config.and_then(|c| c.name.as_deref()),
                host.name.as_deref(),
                host.hostname.as_deref(),
            ]),
            ip: host.ip.clone().unwrap_or_default(),
            hostname: host.hostname.clone().unwrap_or_default(),
            active: host.active != Some(false),
            registered: config.is_some_and(|c| c.registered != Some(false)),
            vpn_enabled: policy.as_deref() == Some(vpn_policy),
            policy,
            mac: mac.clone(),
        };

        match seen.get(&mac) {
            Some(&at) => devices[at] = device,
            None => {
                seen.insert(mac, devices.len());
                devices.push(device);
            }
        }
    }

    // Registered but currently offline
    for host in configured {
        let Some(mac) = normalize_mac(host.mac.as_deref()) else {
            continue;
        };
        if seen.contains_key(&mac) {
            continue;
        }
        let host = config_by_mac.get(&mac).copied().unwrap_or(host);

        seen.insert(mac.clone(), devices.len());
        devices.push(Device {
            name: first_non_empty(&[host.name.as_deref(), host.hostname.as_deref()]),
            ip: host.ip.clone().unwrap_or_default(),
            hostname: host.hostname.clone().unwrap_or_default(),
            active: false,
            registered: true,
            vpn_enabled: host.policy.as_deref() == Some(vpn_policy),
            policy: host.policy.clone(),
            mac,
        });
    }

    sort_devices(&mut devices);
    devices
}

/// Active first, then by label using the Unicode root collation
fn sort_devices(devices: &mut [Device]) {
    match Collator::try_new(&Default::default(), CollatorOptions::new()) {
        Ok(collator) => devices.sort_by(|a, b| {
            compare_devices(a, b, |x, y| collator.compare(x, y).then_with(|| x.cmp(y)))
        }),
        Err(e) => {
            tracing::warn!("Collation data unavailable, sorting by lower-case: {}", e);
            devices.sort_by(|a, b| compare_devices(a, b, lowercase_collate));
        }
    }
}

/// Active first, then by name (or MAC when unnamed)
pub fn compare_devices(
    a: &Device,
    b: &Device,
    collate: impl Fn(&str, &str) -> Ordering,
) -> Ordering {
    b.active
        .cmp(&a.active)
        .then_with(|| collate(a.label(), b.label()))
}

fn lowercase_collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn first_non_empty(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|value| !value.is_empty())
        .map(|value| value.to_string())
        .unwrap_or_default()
}

fn policy_matches(host: &HotspotHost, enabled: bool, vpn_policy: &str) -> bool {
    if enabled {
        host.policy.as_deref() == Some(vpn_policy)
    } else {
        host.policy.as_deref().map_or(true, str::is_empty)
    }
}

/// Permit the host, attach `policy` and save the running configuration
pub fn vpn_on_payload(mac: &str, policy: &str) -> Value {
    json!({
        "ip": {
            "hotspot": {
                "host": { "mac": mac, "permit": true, "policy": policy }
            }
        },
        "system": { "configuration": { "save": {} } }
    })
}

/// Detach any policy from the host and save the running configuration
pub fn vpn_off_payload(mac: &str) -> Value {
    json!({
        "ip": {
            "hotspot": {
                "host": { "mac": mac, "policy": { "no": true } }
            }
        },
        "system": { "configuration": { "save": {} } }
    })
}
