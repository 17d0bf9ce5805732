//! The two gateway directions (§4.6, §4.7): MQTT→SmartWeb (this gateway
//! impersonates virtual controllers) and SmartWeb→MQTT (this gateway
//! discovers and polls remote programs).

pub mod mqtt_to_sw;
pub mod sw_to_mqtt;

pub use mqtt_to_sw::{FreshnessRegistry, MqttToSmartWebController};
pub use sw_to_mqtt::SmartWebToMqttGateway;
