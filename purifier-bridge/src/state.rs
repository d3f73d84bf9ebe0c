use crate::attributes::Attributes;
use crate::config::DeviceConf;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Last known state of one purifier
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub attributes: Attributes,
    /// Last payload the broker accepted, per key
    pub published: HashMap<String, String>,
    pub online: bool,
    pub last_update: Option<OffsetDateTime>,
}

/// One configured purifier. The async lock spans a whole
/// query -> parse -> publish -> store sequence.
#[derive(Debug)]
pub struct Device {
    pub host: String,
    pub name: Option<String>,
    state: tokio::sync::Mutex<DeviceState>,
}

impl Device {
    pub fn new(conf: &DeviceConf) -> Self {
        Self {
            host: conf.host.clone(),
            name: conf.name.clone(),
            state: tokio::sync::Mutex::new(DeviceState::default()),
        }
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, DeviceState> {
        self.state.lock().await
    }

    /// Label for logs: configured name, else host.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }
}

/// All configured devices plus the device-id index filled by polling.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Arc<Device>>,
    by_id: Shared<HashMap<String, Arc<Device>>>,
}

impl DeviceRegistry {
    pub fn new(confs: &[DeviceConf]) -> Self {
        Self {
            devices: confs.iter().map(|c| Arc::new(Device::new(c))).collect(),
            by_id: new_state(HashMap::new()),
        }
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn register_id(&self, device_id: &str, device: &Arc<Device>) {
        self.by_id.lock().insert(device_id.to_string(), Arc::clone(device));
    }

    pub fn by_id(&self, device_id: &str) -> Option<Arc<Device>> {
        self.by_id.lock().get(device_id).cloned()
    }

    pub fn known_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_id.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(host: &str) -> DeviceConf {
        DeviceConf { host: host.into(), name: None }
    }

    #[test]
    fn test_registry_index() {
        let registry = DeviceRegistry::new(&[conf("10.0.0.1"), conf("10.0.0.2")]);
        assert_eq!(registry.devices().len(), 2);
        assert!(registry.by_id("AA11").is_none());

        let second = Arc::clone(&registry.devices()[1]);
        registry.register_id("AA11", &second);
        assert_eq!(registry.by_id("AA11").unwrap().host, "10.0.0.2");
        assert_eq!(registry.known_ids(), vec!["AA11".to_string()]);
    }

    #[tokio::test]
    async fn test_device_starts_offline_and_empty() {
        let device = Device::new(&DeviceConf { host: "10.0.0.3".into(), name: Some("salon".into()) });
        let state = device.lock().await;
        assert!(!state.online);
        assert!(state.attributes.is_empty());
        assert_eq!(device.label(), "salon");
    }
}
