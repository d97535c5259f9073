//! RCI response normalization and MAC address handling

use crate::models::HotspotHost;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static MAC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{2}(:[0-9a-f]{2}){5}$").expect("MAC pattern is valid")
});

/// `aa:bb:cc:dd:ee:ff`, any case
pub fn is_valid_mac(mac: &str) -> bool {
    MAC_RE.is_match(mac)
}

/// Lower-cased MAC, or `None` when absent or malformed
pub fn normalize_mac(mac: Option<&str>) -> Option<String> {
    let mac = mac?.trim();
    is_valid_mac(mac).then(|| mac.to_ascii_lowercase())
}

/// Parse a hotspot response into a flat host list.
///
/// Accepts `{host: {...}}`, `{host: [...]}`, `{}` and an empty body. Array
/// entries that do not decode as a host are skipped so one bad record does not
/// hide the rest of the table.
pub fn parse_hosts(value: Value) -> Result<Vec<HotspotHost>, serde_json::Error> {
    let mut response = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected hotspot object, got {}",
                kind(&other)
            )))
        }
    };

    match response.remove("host") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => Ok(entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(host) => Some(host),
                Err(e) => {
                    tracing::debug!("Skipping host entry {}: {}", index, e);
                    None
                }
            })
            .collect()),
        Some(entry @ Value::Object(_)) => Ok(vec![serde_json::from_value(entry)?]),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected host object or array, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
