//! MQTT side of the bridge
//!
//! Topics:
//! - `<base>/stat/<device-id>/<key>` : one raw attribute value per message
//! - `<base>/cmd/<device-id>/<action>` : bare value token, case-insensitive

use crate::commands::normalize_value;
use crate::config::MqttConf;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const STATE_TOPIC: &str = "stat";
pub const CMD_TOPIC: &str = "cmd";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic {0} is outside the command namespace")]
    Foreign(String),
    #[error("malformed command topic {0}")]
    Malformed(String),
}

/// Inbound command, payload already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub device_id: String,
    pub action: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn state(&self, device_id: &str, key: &str) -> String {
        format!("{}/{}/{}/{}", self.base, STATE_TOPIC, device_id, key)
    }

    pub fn command_filter(&self) -> String {
        format!("{}/{}/#", self.base, CMD_TOPIC)
    }

    /// `<base>/cmd/<device-id>/<action>[/...]`; trailing segments are ignored.
    pub fn parse_command(&self, topic: &str, payload: &[u8]) -> Result<InboundCommand, TopicError> {
        let rest = topic
            .strip_prefix(self.base.as_str())
            .and_then(|t| t.strip_prefix('/'))
            .and_then(|t| t.strip_prefix(CMD_TOPIC))
            .and_then(|t| t.strip_prefix('/'))
            .ok_or_else(|| TopicError::Foreign(topic.to_string()))?;

        let mut parts = rest.split('/');
        match (parts.next(), parts.next()) {
            (Some(device_id), Some(action)) if !device_id.is_empty() && !action.is_empty() => {
                Ok(InboundCommand {
                    device_id: device_id.to_string(),
                    action: action.to_string(),
                    value: normalize_value(&String::from_utf8_lossy(payload)),
                })
            }
            _ => Err(TopicError::Malformed(topic.to_string())),
        }
    }
}

/// Outbound state channel
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

#[async_trait]
impl<T: StateSink + ?Sized> StateSink for std::sync::Arc<T> {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        (**self).publish(topic, payload).await
    }
}

/// rumqttc-backed sink
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    retain: bool,
}

impl MqttSink {
    pub fn new(client: AsyncClient, retain: bool) -> Self {
        Self { client, retain }
    }
}

#[async_trait]
impl StateSink for MqttSink {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, self.retain, payload)
            .await
            .with_context(|| format!("Failed to publish {topic}"))
    }
}

pub fn mqtt_options(conf: &MqttConf) -> MqttOptions {
    let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs.max(5)));
    opts.set_clean_session(true);
    if let Some(user) = &conf.user {
        opts.set_credentials(user, conf.password.clone().unwrap_or_default());
    }
    opts
}

/// Drive the connection: (re)subscribe on every ConnAck, forward commands.
/// Returns when the command receiver is gone.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Topics,
    commands: mpsc::Sender<InboundCommand>,
) {
    let filter = topics.command_filter();
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                info!("Connected to broker ({:?})", ack.code);
                if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
                    error!("Subscribe to {} failed: {}", filter, e);
                } else {
                    debug!("Subscribed to {}", filter);
                }
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                debug!("Incoming message topic={} payload={:?}", p.topic, p.payload);
                match topics.parse_command(&p.topic, &p.payload) {
                    Ok(cmd) => {
                        if commands.send(cmd).await.is_err() {
                            info!("Command handler stopped, leaving MQTT loop");
                            return;
                        }
                    }
                    Err(e) => warn!("Ignoring message: {}", e),
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection error: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new("coap-air-purifier-2-mqtt")
    }

    #[test]
    fn test_state_topic() {
        assert_eq!(
            topics().state("AA11", "pm25"),
            "coap-air-purifier-2-mqtt/stat/AA11/pm25"
        );
        assert_eq!(topics().command_filter(), "coap-air-purifier-2-mqtt/cmd/#");
    }

    #[test]
    fn test_parse_command_topic() {
        let cmd = topics()
            .parse_command("coap-air-purifier-2-mqtt/cmd/AA11/humidity", b" 60 \n")
            .unwrap();
        assert_eq!(
            cmd,
            InboundCommand {
                device_id: "AA11".into(),
                action: "humidity".into(),
                value: "60".into()
            }
        );

        let cmd = topics()
            .parse_command("coap-air-purifier-2-mqtt/cmd/AA11/mode/extra", b"mode_auto")
            .unwrap();
        assert_eq!(cmd.action, "mode");
        assert_eq!(cmd.value, "MODE_AUTO");
    }

    #[test]
    fn test_parse_rejects_foreign_and_malformed() {
        let t = topics();
        assert!(matches!(t.parse_command("other/cmd/AA11/power", b"ON"), Err(TopicError::Foreign(_))));
        assert!(matches!(
            t.parse_command("coap-air-purifier-2-mqtt/stat/AA11/power", b"ON"),
            Err(TopicError::Foreign(_))
        ));
        assert!(matches!(
            t.parse_command("coap-air-purifier-2-mqtt/cmd/AA11", b"ON"),
            Err(TopicError::Malformed(_))
        ));
        assert!(matches!(
            t.parse_command("coap-air-purifier-2-mqtt/cmd//power", b"ON"),
            Err(TopicError::Malformed(_))
        ));
    }

    #[test]
    fn test_nested_base_topic() {
        let t = Topics::new("home/purifiers");
        let cmd = t.parse_command("home/purifiers/cmd/X/power", b"off").unwrap();
        assert_eq!(cmd.device_id, "X");
        assert_eq!(cmd.value, "OFF");
    }

    #[test]
    fn test_options_with_credentials() {
        let conf = MqttConf {
            host: "broker.lan".into(),
            port: 1884,
            user: Some("bridge".into()),
            password: Some("secret".into()),
            client_id: "purifiers".into(),
            keep_alive_secs: 60,
            retain: false,
        };
        let opts = mqtt_options(&conf);
        assert_eq!(opts.broker_address(), ("broker.lan".to_string(), 1884));
        assert_eq!(opts.client_id(), "purifiers");
        assert_eq!(opts.credentials(), Some(("bridge".to_string(), "secret".to_string())));
    }
}
