//! Poll loop, state publisher and command handling
//!
//! Each device runs its own timer loop. Scheduled polls and inbound commands
//! for the same device are serialized by that device's lock; different
//! devices never wait on each other. Inbound commands for one device are
//! drained by a single worker, in arrival order.

use crate::attributes::{AttributeParser, Attributes, HOST_KEY};
use crate::commands::{self, CommandError};
use crate::config::{BridgeConfig, PublishConf};
use crate::execution::{command_args, DeviceProxy, RetryPolicy};
use crate::fan::{FanService, FanSpeed, FanView};
use crate::mqtt::{InboundCommand, StateSink, Topics};
use crate::state::{Device, DeviceRegistry, DeviceState};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Extra per-device topics next to the attribute keys
pub const JSON_ATTRIBUTES_KEY: &str = "attributes";
pub const AVAILABILITY_KEY: &str = "availability";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Published { device_id: String, messages: usize },
    /// Output carried no device id: nothing published, nothing stored.
    NoDeviceId,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    UnknownDevice,
    Rejected(CommandError),
    Failed,
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub retry: RetryPolicy,
    pub publish: PublishConf,
    pub refresh_after_command: bool,
}

impl BridgeOptions {
    pub fn from_config(cfg: &BridgeConfig) -> Self {
        Self {
            retry: RetryPolicy::new(cfg.airctrl.attempts(), cfg.airctrl.retry_delay()),
            publish: cfg.publish.clone(),
            refresh_after_command: cfg.refresh_after_command,
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            publish: PublishConf::default(),
            refresh_after_command: true,
        }
    }
}

#[derive(Serialize)]
struct AttributesDocument<'a> {
    #[serde(flatten)]
    attributes: &'a Attributes,
    online: bool,
    speed: Option<FanSpeed>,
    updated_at: String,
}

pub struct Bridge<P, S> {
    proxy: P,
    sink: S,
    parser: AttributeParser,
    registry: DeviceRegistry,
    topics: Topics,
    options: BridgeOptions,
}

impl<P, S> Bridge<P, S>
where
    P: DeviceProxy + 'static,
    S: StateSink + 'static,
{
    pub fn new(proxy: P, sink: S, registry: DeviceRegistry, topics: Topics, options: BridgeOptions) -> Self {
        Self {
            proxy,
            sink,
            parser: AttributeParser::new(),
            registry,
            topics,
            options,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// One poll cycle for one device.
    pub async fn poll_device(&self, device: &Arc<Device>) -> PollOutcome {
        let mut state = device.lock().await;
        self.poll_locked(device, &mut state).await
    }

    /// Poll every device concurrently.
    pub async fn poll_all(&self) -> Vec<PollOutcome> {
        let polls = self.registry.devices().iter().map(|d| self.poll_device(d));
        join_all(polls).await
    }

    async fn poll_locked(&self, device: &Arc<Device>, state: &mut DeviceState) -> PollOutcome {
        debug!("Querying device at host={}", device.host);
        let output = match self.proxy.execute(&device.host, "").await {
            Ok(result) => result.output,
            Err(e) => {
                error!("Unable to update device {} ({}): {}", device.label(), device.host, e);
                self.mark_unreachable(state).await;
                return PollOutcome::Unreachable;
            }
        };

        let mut attributes = self.parser.parse(&output);
        attributes.set(HOST_KEY, device.host.as_str());

        let Some(device_id) = attributes.device_id().map(str::to_string) else {
            debug!("No device id in output from {}, discarding", device.host);
            return PollOutcome::NoDeviceId;
        };

        debug!("Publishing state for device_id={}", device_id);
        let mut messages = 0;
        for (key, value) in attributes.iter() {
            if self.options.publish.only_changes
                && state.online
                && state.published.get(key).map(String::as_str) == Some(value)
            {
                continue;
            }
            if self.publish(&device_id, key, value.to_string()).await {
                state.published.insert(key.to_string(), value.to_string());
                messages += 1;
            } else {
                // resent on the next cycle
                state.published.remove(key);
            }
        }

        let now = OffsetDateTime::now_utc();
        if self.options.publish.json_attributes {
            let doc = AttributesDocument {
                attributes: &attributes,
                online: true,
                speed: FanView::new(&attributes, true).speed,
                updated_at: now
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default(),
            };
            match serde_json::to_string(&doc) {
                Ok(payload) => {
                    if self.publish(&device_id, JSON_ATTRIBUTES_KEY, payload).await {
                        messages += 1;
                    }
                }
                Err(e) => error!("Failed to serialize attributes of {}: {}", device_id, e),
            }
        }
        if self.options.publish.availability && self.publish(&device_id, AVAILABILITY_KEY, "online".into()).await {
            messages += 1;
        }

        state.attributes = attributes;
        state.online = true;
        state.last_update = Some(now);
        self.registry.register_id(&device_id, device);

        PollOutcome::Published { device_id, messages }
    }

    async fn mark_unreachable(&self, state: &mut DeviceState) {
        let was_online = std::mem::replace(&mut state.online, false);
        if !self.options.publish.availability {
            return;
        }
        if let Some(device_id) = state.attributes.device_id().map(str::to_string) {
            if was_online {
                info!("Device {} is now offline", device_id);
            }
            self.publish(&device_id, AVAILABILITY_KEY, "offline".into()).await;
        }
    }

    async fn publish(&self, device_id: &str, key: &str, payload: String) -> bool {
        let topic = self.topics.state(device_id, key);
        match self.sink.publish(&topic, payload).await {
            Ok(()) => true,
            Err(e) => {
                error!("{:#}", e);
                false
            }
        }
    }

    /// Inbound command path. Failures are logged, never returned to the sender.
    pub async fn handle_command(&self, cmd: InboundCommand) -> CommandOutcome {
        let Some(device) = self.registry.by_id(&cmd.device_id) else {
            warn!("No host for device id {}, ignoring action {}", cmd.device_id, cmd.action);
            return CommandOutcome::UnknownDevice;
        };

        let fragment = match commands::translate(&cmd.action, &cmd.value) {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!("Device {}: {}", cmd.device_id, e);
                return CommandOutcome::Rejected(e);
            }
        };

        let mut state = device.lock().await;
        let host = state.attributes.host().unwrap_or(&device.host).to_string();
        debug!("Running action={} value={} on host={}", cmd.action, cmd.value, host);

        if let Err(e) = self.options.retry.run(&self.proxy, &host, &command_args(fragment)).await {
            error!("Command {}={} failed on {}: {}", cmd.action, cmd.value, cmd.device_id, e);
            return CommandOutcome::Failed;
        }
        info!("Applied {}={} on {}", cmd.action, cmd.value, cmd.device_id);

        if self.options.refresh_after_command {
            self.poll_locked(&device, &mut state).await;
        }
        CommandOutcome::Applied
    }

    /// Entity service call, routed through the same command path.
    /// Not used by the binary.
    pub async fn call_service(&self, device_id: &str, service: FanService) -> CommandOutcome {
        let (action, value) = service.command();
        self.handle_command(InboundCommand {
            device_id: device_id.to_string(),
            action: action.to_string(),
            value: commands::normalize_value(&value),
        })
        .await
    }

    /// Fan entity snapshot from the last stored state.
    pub async fn fan_view(&self, device_id: &str) -> Option<FanView> {
        let device = self.registry.by_id(device_id)?;
        let state = device.lock().await;
        Some(FanView::new(&state.attributes, state.online))
    }

    /// Timer loop for one device; the first poll runs immediately.
    pub async fn run_poll_loop(self: Arc<Self>, device: Arc<Device>, period: Duration) {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            timer.tick().await;
            let outcome = self.poll_device(&device).await;
            debug!("Poll of {} -> {:?}", device.label(), outcome);
        }
    }

    pub fn spawn_pollers(self: &Arc<Self>, period: Duration) -> Vec<JoinHandle<()>> {
        self.registry
            .devices()
            .iter()
            .map(|device| tokio::spawn(Arc::clone(self).run_poll_loop(Arc::clone(device), period)))
            .collect()
    }

    /// Consume inbound commands. Each device gets one worker draining its own
    /// queue, so commands for a device run in arrival order while different
    /// devices proceed in parallel. Returns once every queued command ran.
    pub async fn run_command_handler(self: Arc<Self>, mut commands: mpsc::Receiver<InboundCommand>) {
        let mut queues: HashMap<String, mpsc::UnboundedSender<InboundCommand>> = HashMap::new();
        let mut workers = Vec::new();

        while let Some(cmd) = commands.recv().await {
            let Some(device) = self.registry.by_id(&cmd.device_id) else {
                warn!("No host for device id {}, ignoring action {}", cmd.device_id, cmd.action);
                continue;
            };
            let queue = queues.entry(device.host.clone()).or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                debug!("Starting command worker for {}", device.label());
                workers.push(tokio::spawn(Arc::clone(&self).run_device_worker(rx)));
                tx
            });
            if queue.send(cmd).is_err() {
                error!("Command worker for {} is gone", device.label());
            }
        }

        drop(queues);
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!("Command worker panicked: {}", e);
            }
        }
    }

    async fn run_device_worker(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<InboundCommand>) {
        while let Some(cmd) = queue.recv().await {
            self.handle_command(cmd).await;
        }
    }
}
