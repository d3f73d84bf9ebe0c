//! Bridge configuration (`configuration.yml`)
//!
//! Handles:
//! - MQTT broker settings and credentials
//! - Device list (one airctrl host per purifier)
//! - Poll timer, clamped to `MAX_POLL_INTERVAL_SECS`
//! - airctrl invocation tuning (binary, timeout, retries)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_TOPIC: &str = "coap-air-purifier-2-mqtt";
pub const DEFAULT_CONFIG_PATH: &str = "configuration.yml";
pub const CONFIG_ENV_VAR: &str = "PURIFIER_BRIDGE_CONFIG";
pub const MAX_POLL_INTERVAL_SECS: u64 = 900;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("configuration missing required section: {0}")]
    MissingSection(&'static str),
    #[error("configuration missing required field: {0}")]
    MissingField(&'static str),
}

/// Raw file layout. Required sections stay optional here so a missing one
/// reports a precise `ConfigError` instead of a serde message.
#[derive(Debug, Deserialize)]
struct RawConfig {
    mqtt: Option<RawMqtt>,
    devices: Option<Vec<DeviceConf>>,
    #[serde(default)]
    timers: TimersConf,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    airctrl: AirCtrlConf,
    #[serde(default = "default_base_topic")]
    base_topic: String,
    #[serde(default)]
    publish: PublishConf,
    #[serde(default = "default_true")]
    refresh_after_command: bool,
}

#[derive(Debug, Deserialize)]
struct RawMqtt {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    keep_alive_secs: Option<u64>,
    #[serde(default)]
    retain: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeConfig {
    pub mqtt: MqttConf,
    pub devices: Vec<DeviceConf>,
    pub timers: TimersConf,
    pub debug: bool,
    pub airctrl: AirCtrlConf,
    pub base_topic: String,
    pub publish: PublishConf,
    pub refresh_after_command: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub retain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConf {
    pub host: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConf {
    /// Seconds between two status queries of the same device
    #[serde(default = "default_polling")]
    pub polling: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirCtrlConf {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConf {
    #[serde(default)]
    pub only_changes: bool,
    #[serde(default)]
    pub json_attributes: bool,
    #[serde(default = "default_true")]
    pub availability: bool,
}

fn default_base_topic() -> String {
    DEFAULT_BASE_TOPIC.to_string()
}
fn default_true() -> bool {
    true
}
fn default_polling() -> u64 {
    5
}
fn default_binary() -> String {
    "airctrl".to_string()
}
fn default_timeout() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    500
}

impl Default for TimersConf {
    fn default() -> Self {
        Self { polling: default_polling() }
    }
}

impl Default for AirCtrlConf {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl Default for PublishConf {
    fn default() -> Self {
        Self {
            only_changes: false,
            json_attributes: false,
            availability: true,
        }
    }
}

impl TimersConf {
    /// Effective poll period: never above 900s, never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(clamp_poll_secs(self.polling))
    }
}

pub fn clamp_poll_secs(secs: u64) -> u64 {
    secs.clamp(1, MAX_POLL_INTERVAL_SECS)
}

impl AirCtrlConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl BridgeConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(txt)?;

        let mqtt = raw.mqtt.ok_or(ConfigError::MissingSection("mqtt"))?;
        let devices = raw.devices.ok_or(ConfigError::MissingSection("devices"))?;
        if devices.is_empty() {
            return Err(ConfigError::MissingSection("devices"));
        }
        if devices.iter().any(|d| d.host.trim().is_empty()) {
            return Err(ConfigError::MissingField("devices[].host"));
        }

        let host = mqtt.host.ok_or(ConfigError::MissingField("mqtt.host"))?;
        let port = mqtt.port.ok_or(ConfigError::MissingField("mqtt.port"))?;

        Ok(Self {
            mqtt: MqttConf {
                host,
                port,
                user: mqtt.user,
                password: mqtt.password,
                client_id: mqtt.client_id.unwrap_or_else(default_base_topic),
                keep_alive_secs: mqtt.keep_alive_secs.unwrap_or(60),
                retain: mqtt.retain,
            },
            devices,
            timers: raw.timers,
            debug: raw.debug,
            airctrl: raw.airctrl,
            base_topic: raw.base_topic.trim_end_matches('/').to_string(),
            publish: raw.publish,
            refresh_after_command: raw.refresh_after_command,
        })
    }

    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let txt = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml(&txt)
    }

    /// Load from `$PURIFIER_BRIDGE_CONFIG`, falling back to `configuration.yml`.
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(path).await
    }
}
