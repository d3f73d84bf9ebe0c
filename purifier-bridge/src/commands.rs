//! Command translation: logical action + value token -> airctrl arguments
//!
//! The table is fixed. An unknown action or value never reaches the device.

use crate::fan::FanSpeed;
use thiserror::Error;

pub type CommandTable = &'static [(&'static str, &'static [(&'static str, &'static str)])];

/// action -> (accepted value -> airctrl fragment)
pub const COMMAND_MAP: CommandTable = &[
    ("power", &[("OFF", "--pwr 0"), ("ON", "--pwr 1")]),
    (
        "mode",
        &[
            ("MODE_OFF", "--pwr 0"),
            ("MANUAL_SPEED_LOW", "--mode M --om 1"),
            ("MANUAL_SPEED_MEDIUM", "--mode M --om 2"),
            ("MANUAL_SPEED_HIGH", "--mode M --om 3"),
            ("MODE_TURBO", "--mode M --om t"),
            ("MODE_AUTO", "--mode P"),
            ("MODE_ALLERGEN", "--mode A"),
            ("MODE_SILENT", "--mode S"),
        ],
    ),
    (
        "humidity",
        &[
            ("VALUE_40", "--rhset 40"),
            ("VALUE_50", "--rhset 50"),
            ("VALUE_60", "--rhset 60"),
            ("VALUE_70", "--rhset 70"),
        ],
    ),
    ("function", &[("P", "--func P"), ("PH", "--func PH")]),
    (
        "light_brightness",
        &[
            ("VALUE_0", "--aqil 0"),
            ("VALUE_25", "--aqil 25"),
            ("VALUE_50", "--aqil 50"),
            ("VALUE_75", "--aqil 75"),
            ("VALUE_100", "--aqil 100"),
        ],
    ),
    ("child_lock", &[("TRUE", "--cl True"), ("FALSE", "--cl False")]),
];

/// Pseudo action taking fan speed names, resolved through the `mode` table.
pub const SPEED_ACTION: &str = "speed";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown action {0}")]
    UnknownAction(String),
    #[error("unknown value {value} for action {action}")]
    UnknownValue { action: String, value: String },
}

/// Payload normalization: trimmed, uppercased.
pub fn normalize_value(payload: &str) -> String {
    payload.trim().to_uppercase()
}

fn action_table(action: &str) -> Option<&'static [(&'static str, &'static str)]> {
    COMMAND_MAP
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, values)| *values)
}

fn lookup(values: &'static [(&'static str, &'static str)], token: &str) -> Option<&'static str> {
    values
        .iter()
        .find(|(accepted, _)| *accepted == token)
        .map(|(_, fragment)| *fragment)
}

fn bool_alias(token: &str) -> Option<&'static str> {
    match token {
        "ON" | "YES" | "1" => Some("TRUE"),
        "OFF" | "NO" | "0" => Some("FALSE"),
        _ => None,
    }
}

/// Resolve one command. `value` is expected already normalized.
pub fn translate(action: &str, value: &str) -> Result<&'static str, CommandError> {
    let unknown_value = || CommandError::UnknownValue {
        action: action.to_string(),
        value: value.to_string(),
    };

    if action == SPEED_ACTION {
        let mode = FanSpeed::from_name(value)
            .map(FanSpeed::mode_token)
            .ok_or_else(unknown_value)?;
        return translate("mode", mode);
    }

    let values = action_table(action).ok_or_else(|| CommandError::UnknownAction(action.to_string()))?;

    lookup(values, value)
        .or_else(|| lookup(values, &format!("VALUE_{value}")))
        .or_else(|| {
            if action == "child_lock" {
                bool_alias(value).and_then(|alias| lookup(values, alias))
            } else {
                None
            }
        })
        .ok_or_else(unknown_value)
}

/// Every (action, value) pair of the fixed table.
pub fn supported_pairs() -> impl Iterator<Item = (&'static str, &'static str, &'static str)> {
    COMMAND_MAP
        .iter()
        .flat_map(|(action, values)| values.iter().map(move |(value, fragment)| (*action, *value, *fragment)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_examples() {
        assert_eq!(translate("mode", "MODE_ALLERGEN"), Ok("--mode A"));
        assert_eq!(translate("mode", "MODE_AUTO"), Ok("--mode P"));
        assert_eq!(translate("power", "OFF"), Ok("--pwr 0"));
        assert_eq!(translate("humidity", "60"), Ok("--rhset 60"));
    }

    #[test]
    fn test_every_table_pair_translates() {
        let mut count = 0;
        for (action, value, fragment) in supported_pairs() {
            assert_eq!(translate(action, value), Ok(fragment), "{action}/{value}");
            count += 1;
        }
        assert_eq!(count, 23);
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(
            translate("volume", "ON"),
            Err(CommandError::UnknownAction("volume".into()))
        );
    }

    #[test]
    fn test_unknown_value() {
        assert_eq!(
            translate("humidity", "65"),
            Err(CommandError::UnknownValue {
                action: "humidity".into(),
                value: "65".into()
            })
        );
        assert!(translate("power", "TOGGLE").is_err());
        assert!(translate("mode", "").is_err());
    }

    #[test]
    fn test_value_prefix_and_bool_aliases() {
        assert_eq!(translate("light_brightness", "25"), Ok("--aqil 25"));
        assert_eq!(translate("light_brightness", "VALUE_100"), Ok("--aqil 100"));
        assert_eq!(translate("child_lock", "ON"), Ok("--cl True"));
        assert_eq!(translate("child_lock", "0"), Ok("--cl False"));
        assert!(translate("power", "1").is_err());
    }

    #[test]
    fn test_speed_routes_through_mode_table() {
        assert_eq!(translate(SPEED_ACTION, "LOW"), Ok("--mode M --om 1"));
        assert_eq!(translate(SPEED_ACTION, "TURBO"), Ok("--mode M --om t"));
        assert_eq!(translate(SPEED_ACTION, "AUTO"), Ok("--mode P"));
        assert_eq!(translate(SPEED_ACTION, "OFF"), Ok("--pwr 0"));
        assert!(translate(SPEED_ACTION, "WARP").is_err());
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("  mode_auto\n"), "MODE_AUTO");
        assert_eq!(normalize_value("60"), "60");
    }
}
