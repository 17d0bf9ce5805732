//! Broker client abstraction (§1, §6): publish/subscribe and device/control
//! CRUD against the message broker. The broker itself is an external
//! collaborator; this module defines the interface both gateways use and
//! ships one concrete adapter behind it.

pub mod mqtt_client;
pub mod types;

pub use mqtt_client::{BrokerClient, MqttBrokerClient};
pub use types::{ControlMeta, ValueChangeEvent};
