//! Philips air purifier (CoAP) to MQTT bridge
//!
//! Polls every configured purifier through the `airctrl` CLI, scrapes its
//! `[key] description: value` output into a flat attribute map and publishes
//! one MQTT message per attribute. Commands arriving on
//! `<base>/cmd/<device-id>/<action>` are translated into airctrl arguments
//! through a fixed table.
//!
//! The binary only speaks raw MQTT. [`fan`] together with
//! [`Bridge::fan_view`] and [`Bridge::call_service`] is library API for
//! embedders that present each purifier as a fan entity; service calls go
//! through the same command path as MQTT commands.

pub mod attributes;
pub mod commands;
pub mod config;
pub mod execution;
pub mod fan;
pub mod mqtt;
pub mod poller;
pub mod state;

pub use attributes::{AttributeParser, Attributes};
pub use config::BridgeConfig;
pub use execution::{AirCtrl, DeviceProxy};
pub use fan::{FanService, FanSpeed, FanView};
pub use mqtt::{StateSink, Topics};
pub use poller::{Bridge, BridgeOptions, CommandOutcome, PollOutcome};
pub use state::DeviceRegistry;
