//! coap-air-purifier-2-mqtt - bridge entry point
//!
//! Bootstrap: .env, configuration, logging, MQTT client, one poll loop per
//! device and the inbound command handler.

use anyhow::{Context, Result};
use purifier_bridge::config::BridgeConfig;
use purifier_bridge::execution::AirCtrl;
use purifier_bridge::mqtt::{self, MqttSink, Topics};
use purifier_bridge::poller::{Bridge, BridgeOptions};
use purifier_bridge::state::DeviceRegistry;
use rumqttc::AsyncClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    // Only configuration errors abort the process.
    let cfg = BridgeConfig::load().await.context("Failed to load configuration")?;
    init_logging(cfg.debug);

    info!(
        "Starting coap-air-purifier-2-mqtt: {} device(s), polling every {:?}",
        cfg.devices.len(),
        cfg.timers.poll_interval()
    );

    let (client, eventloop) = AsyncClient::new(mqtt::mqtt_options(&cfg.mqtt), 64);
    let topics = Topics::new(cfg.base_topic.clone());

    let bridge = Arc::new(Bridge::new(
        AirCtrl::new(cfg.airctrl.binary.clone(), cfg.airctrl.timeout()),
        MqttSink::new(client.clone(), cfg.mqtt.retain),
        DeviceRegistry::new(&cfg.devices),
        topics.clone(),
        BridgeOptions::from_config(&cfg),
    ));

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(Arc::clone(&bridge).run_command_handler(rx));
    let _pollers = bridge.spawn_pollers(cfg.timers.poll_interval());

    tokio::select! {
        _ = mqtt::run_event_loop(eventloop, client, topics, tx) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
