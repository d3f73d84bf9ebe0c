//! Attribute scraping of `airctrl` status output
//!
//! airctrl prints one field per line as `[<key>] <description>: <value>`.
//! Every field we care about is listed in `ATTRIBUTE_KEYS`; a field missing
//! from the output (firmware variance) is simply an empty string.

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::warn;

/// Published attribute name -> key printed by airctrl, in publish order.
pub const ATTRIBUTE_KEYS: &[(&str, &str)] = &[
    ("name", "name"),
    ("type", "type"),
    ("model_id", "modelid"),
    ("sw_version", "swversion"),
    ("fan_speed", "om"),
    ("state", "pwr"),
    ("child_lock", "cl"),
    ("light_brightness", "aqil"),
    ("buttons_light", "uil"),
    ("mode", "mode"),
    ("function", "func"),
    ("target_humidity", "rhset"),
    ("humidity", "rh"),
    ("temperature", "temp"),
    ("pm25", "pm25"),
    ("allergen_index", "iaql"),
    ("used_index", "ddp"),
    ("error", "err"),
    ("water_level", "wl"),
    ("hepa_filter_type", "fltt1"),
    ("carbon_filter_type", "fltt2"),
    ("pre_filter", "fltsts0"),
    ("hepa_filter", "fltsts1"),
    ("carbon_filter", "fltsts2"),
    ("wick_filter", "wicksts"),
    ("range", "range"),
    ("runtime", "Runtime"),
    ("wifi_version", "WifiVersion"),
    ("product_id", "ProductId"),
    ("device_id", "DeviceId"),
    ("status_type", "StatusType"),
    ("connect_type", "ConnectType"),
];

pub const DEVICE_ID_KEY: &str = "device_id";
pub const HOST_KEY: &str = "host";

fn key_pattern(key: &str) -> Result<Regex, regex::Error> {
    // `.` never crosses a newline: key, description and value share one line.
    Regex::new(&format!(r"\[({})\](.*): (.*)", regex::escape(key)))
}

fn capture_value(pattern: &Regex, raw: &str) -> String {
    pattern
        .captures(raw)
        .and_then(|c| c.get(3))
        .map(|m| m.as_str().trim_end_matches('\r').to_string())
        .unwrap_or_default()
}

/// Value printed for `key`, or an empty string when the line is absent.
pub fn extract(raw: &str, key: &str) -> String {
    match key_pattern(key) {
        Ok(pattern) => capture_value(&pattern, raw),
        Err(_) => String::new(),
    }
}

/// Flat, ordered attribute mapping. Values stay raw strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the first insertion position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Missing keys read as the empty string.
    pub fn get(&self, key: &str) -> &str {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Vendor device id, only when non-empty.
    pub fn device_id(&self) -> Option<&str> {
        Some(self.get(DEVICE_ID_KEY)).filter(|id| !id.is_empty())
    }

    pub fn host(&self) -> Option<&str> {
        Some(self.get(HOST_KEY)).filter(|h| !h.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Pre-compiled patterns for the whole `ATTRIBUTE_KEYS` table.
pub struct AttributeParser {
    patterns: Vec<(&'static str, Option<Regex>)>,
}

impl AttributeParser {
    pub fn new() -> Self {
        let patterns = ATTRIBUTE_KEYS
            .iter()
            .map(|(name, key)| {
                let pattern = key_pattern(key)
                    .map_err(|e| warn!("Unusable pattern for attribute {}: {}", name, e))
                    .ok();
                (*name, pattern)
            })
            .collect();
        Self { patterns }
    }

    /// Extract every known attribute from one status dump.
    pub fn parse(&self, raw: &str) -> Attributes {
        let mut attributes = Attributes::new();
        for (name, pattern) in &self.patterns {
            let value = pattern
                .as_ref()
                .map(|p| capture_value(p, raw))
                .unwrap_or_default();
            attributes.set(*name, value);
        }
        attributes
    }
}

impl Default for AttributeParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "\
[name]      Name: Bedroom
[type]      Type: AC2729
[modelid]   ModelId: AC2729/10
[swversion] Version: 0.2.1
[om]        Fan speed: 2
[pwr]       Power: ON
[cl]        Child lock: False
[aqil]      Light brightness: 100
[mode]      Mode: P
[func]      Function: PH
[rhset]     Target humidity: 50
[rh]        Humidity: 41
[temp]      Temperature: 22
[pm25]      PM25: 4
[iaql]      Allergen index: 1
[DeviceId]  DeviceId: 1c55f3a4e0b211e9
";

    #[test]
    fn test_extract_single_line() {
        assert_eq!(extract("[pwr] power: ON", "pwr"), "ON");
    }

    #[test]
    fn test_extract_missing_key_is_empty() {
        assert_eq!(extract(STATUS, "wicksts"), "");
        assert_eq!(extract("", "pwr"), "");
    }

    #[test]
    fn test_extract_does_not_confuse_prefixed_keys() {
        assert_eq!(extract(STATUS, "rh"), "41");
        assert_eq!(extract(STATUS, "rhset"), "50");
    }

    #[test]
    fn test_extract_escapes_metacharacters() {
        let raw = "[a.b] Dotted: yes\n[axb] Other: no\n[c+] Plus: 3";
        assert_eq!(extract(raw, "a.b"), "yes");
        assert_eq!(extract(raw, "c+"), "3");
        assert_eq!(extract(raw, "(x"), "");
    }

    #[test]
    fn test_extract_takes_text_after_last_separator() {
        assert_eq!(extract("[err] Error: code: 49408", "err"), "49408");
    }

    #[test]
    fn test_extract_strips_carriage_return() {
        assert_eq!(extract("[pwr] Power: OFF\r\n", "pwr"), "OFF");
    }

    #[test]
    fn test_parse_full_status() {
        let attrs = AttributeParser::new().parse(STATUS);
        assert_eq!(attrs.len(), ATTRIBUTE_KEYS.len());
        assert_eq!(attrs.get("name"), "Bedroom");
        assert_eq!(attrs.get("model_id"), "AC2729/10");
        assert_eq!(attrs.get("state"), "ON");
        assert_eq!(attrs.get("fan_speed"), "2");
        assert_eq!(attrs.get("target_humidity"), "50");
        assert_eq!(attrs.get("wick_filter"), "");
        assert_eq!(attrs.device_id(), Some("1c55f3a4e0b211e9"));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let parser = AttributeParser::new();
        assert_eq!(parser.parse(STATUS), parser.parse(STATUS));
    }

    #[test]
    fn test_parse_keeps_table_order() {
        let attrs = AttributeParser::new().parse("");
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        let expected: Vec<&str> = ATTRIBUTE_KEYS.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, expected);
        assert_eq!(attrs.device_id(), None);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut attrs = Attributes::new();
        attrs.set("a", "1");
        attrs.set("b", "2");
        attrs.set("a", "3");
        assert_eq!(attrs.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
        assert!(attrs.contains("b"));
        assert_eq!(attrs.get("zzz"), "");
    }

    #[test]
    fn test_serialize_as_ordered_object() {
        let mut attrs = Attributes::new();
        attrs.set("state", "ON");
        attrs.set("host", "10.0.0.2");
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"state":"ON","host":"10.0.0.2"}"#);
    }
}
