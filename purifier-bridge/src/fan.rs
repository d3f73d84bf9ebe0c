//! Fan entity view of a purifier
//!
//! Derives the entity-level `state`/`speed` from the raw attribute mapping and
//! exposes the entity service calls (humidity, function, brightness, child
//! lock, speed, on/off) as validated (action, value) pairs for the translator.

use crate::attributes::Attributes;
use serde::Serialize;
use thiserror::Error;

pub const HUMIDITY_OPTIONS: &[&str] = &["40", "50", "60", "70"];
pub const FUNCTION_OPTIONS: &[&str] = &["P", "PH"];
pub const BRIGHTNESS_OPTIONS: &[&str] = &["0", "25", "50", "75", "100"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    Off,
    Low,
    Medium,
    High,
    Turbo,
    Allergen,
    Auto,
    Silent,
}

impl FanSpeed {
    pub const ALL: [FanSpeed; 8] = [
        FanSpeed::Off,
        FanSpeed::Low,
        FanSpeed::Medium,
        FanSpeed::High,
        FanSpeed::Turbo,
        FanSpeed::Allergen,
        FanSpeed::Auto,
        FanSpeed::Silent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FanSpeed::Off => "off",
            FanSpeed::Low => "low",
            FanSpeed::Medium => "medium",
            FanSpeed::High => "high",
            FanSpeed::Turbo => "turbo",
            FanSpeed::Allergen => "allergen",
            FanSpeed::Auto => "auto",
            FanSpeed::Silent => "silent",
        }
    }

    /// Case-insensitive lookup by entity speed name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Matching value of the `mode` command table.
    pub fn mode_token(self) -> &'static str {
        match self {
            FanSpeed::Off => "MODE_OFF",
            FanSpeed::Low => "MANUAL_SPEED_LOW",
            FanSpeed::Medium => "MANUAL_SPEED_MEDIUM",
            FanSpeed::High => "MANUAL_SPEED_HIGH",
            FanSpeed::Turbo => "MODE_TURBO",
            FanSpeed::Allergen => "MODE_ALLERGEN",
            FanSpeed::Auto => "MODE_AUTO",
            FanSpeed::Silent => "MODE_SILENT",
        }
    }

    /// Speed as reported by the device: mode first, then manual fan speed.
    pub fn from_attributes(attrs: &Attributes) -> Option<Self> {
        let mode = attrs.get("mode");
        if mode.eq_ignore_ascii_case("auto") || mode == "P" {
            return Some(FanSpeed::Auto);
        }
        if mode.eq_ignore_ascii_case("allergen") || mode == "A" {
            return Some(FanSpeed::Allergen);
        }
        match attrs.get("fan_speed") {
            "0" => Some(FanSpeed::Off),
            "1" => Some(FanSpeed::Low),
            "2" => Some(FanSpeed::Medium),
            "3" => Some(FanSpeed::High),
            s if s.eq_ignore_ascii_case("t") || s.eq_ignore_ascii_case("turbo") => Some(FanSpeed::Turbo),
            s if s.eq_ignore_ascii_case("s") || s.eq_ignore_ascii_case("silent") => Some(FanSpeed::Silent),
            _ => None,
        }
    }
}

/// Entity snapshot; everything is unknown while the device is offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanView {
    pub state: Option<&'static str>,
    pub speed: Option<FanSpeed>,
}

impl FanView {
    pub fn new(attrs: &Attributes, online: bool) -> Self {
        if !online {
            return Self { state: None, speed: None };
        }
        let state = if attrs.get("state") == "ON" { "on" } else { "off" };
        Self {
            state: Some(state),
            speed: FanSpeed::from_attributes(attrs),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{value} is not a valid {field} (expected one of {allowed:?})")]
    InvalidOption {
        field: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },
    #[error("unknown speed {0}")]
    UnknownSpeed(String),
}

/// Entity service calls, validated against the option lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanService {
    TurnOn(Option<FanSpeed>),
    TurnOff,
    SetSpeed(FanSpeed),
    SetHumidity(&'static str),
    SetFunction(&'static str),
    SetLightBrightness(&'static str),
    SetChildLock(bool),
}

fn pick(field: &'static str, allowed: &'static [&'static str], value: &str) -> Result<&'static str, ServiceError> {
    let value = value.trim();
    allowed
        .iter()
        .find(|opt| opt.eq_ignore_ascii_case(value))
        .copied()
        .ok_or_else(|| ServiceError::InvalidOption {
            field,
            value: value.to_string(),
            allowed,
        })
}

impl FanService {
    pub fn set_humidity(humidity: &str) -> Result<Self, ServiceError> {
        pick("humidity", HUMIDITY_OPTIONS, humidity).map(FanService::SetHumidity)
    }

    pub fn set_function(function: &str) -> Result<Self, ServiceError> {
        pick("function", FUNCTION_OPTIONS, function).map(FanService::SetFunction)
    }

    pub fn set_light_brightness(brightness: &str) -> Result<Self, ServiceError> {
        pick("brightness", BRIGHTNESS_OPTIONS, brightness).map(FanService::SetLightBrightness)
    }

    pub fn set_speed(speed: &str) -> Result<Self, ServiceError> {
        FanSpeed::from_name(speed)
            .map(FanService::SetSpeed)
            .ok_or_else(|| ServiceError::UnknownSpeed(speed.to_string()))
    }

    /// (action, value) understood by `commands::translate`.
    pub fn command(&self) -> (&'static str, String) {
        match self {
            FanService::TurnOn(None) => ("power", "ON".into()),
            FanService::TurnOn(Some(speed)) | FanService::SetSpeed(speed) => {
                ("mode", speed.mode_token().into())
            }
            FanService::TurnOff => ("power", "OFF".into()),
            FanService::SetHumidity(v) => ("humidity", v.to_string()),
            FanService::SetFunction(v) => ("function", v.to_string()),
            FanService::SetLightBrightness(v) => ("light_brightness", v.to_string()),
            FanService::SetChildLock(true) => ("child_lock", "TRUE".into()),
            FanService::SetChildLock(false) => ("child_lock", "FALSE".into()),
        }
    }
}
