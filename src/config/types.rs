//! Configuration JSON shape (§6). Schema validation is out of scope (§1);
//! `serde_json` parses directly into these types and any shape mismatch
//! surfaces as a plain `GatewayError::Config`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SensorMapping {
    pub channel: String,
    pub sensor_index: u8,
    #[serde(default)]
    pub value_timeout_min: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputMapping {
    pub channel: String,
    pub output_index: u8,
    #[serde(default)]
    pub value_timeout_min: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterMapping {
    pub channel: String,
    pub program_type: u8,
    pub parameter_id: u8,
    pub parameter_index: u8,
    #[serde(default)]
    pub value_timeout_min: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    pub controller_id: u8,
    #[serde(default)]
    pub sensors: Vec<SensorMapping>,
    #[serde(default)]
    pub outputs: Vec<OutputMapping>,
    #[serde(default)]
    pub parameters: Vec<ParameterMapping>,
}

fn default_poll_interval_ms() -> u32 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u32,
}

/// Splits a `"device/control"` channel string into its two parts.
pub fn split_channel(channel: &str) -> Option<(&str, &str)> {
    channel.split_once('/')
}
