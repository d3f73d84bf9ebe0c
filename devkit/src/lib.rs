/*!
# Purifier DevKit - Stubs et fixtures pour le bridge

Bibliothèque facilitant les tests du bridge avec:
- Stub MQTT enregistrant les publications (tests sans broker)
- Sorties airctrl types (statut complet, firmware partiel, échec d'envoi)
*/

pub mod fixtures;
pub mod mqtt_stub;

pub use mqtt_stub::{MockMessage, MockMqttClient};
