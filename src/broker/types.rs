//! Broker-side data shapes shared by both gateway directions.

#[derive(Debug, Clone, PartialEq)]
pub struct ControlMeta {
    pub display_type: String,
    pub read_only: bool,
    pub max: Option<f64>,
    pub units: Option<String>,
}

impl ControlMeta {
    /// Maps a program-class field's declared display type to the broker
    /// control conventions of §6.
    pub fn from_display_type(display_type: &str, read_only: bool) -> Self {
        let (mapped, max, units) = match display_type {
            "temperature" => ("temperature", None, None),
            "humidity" => ("rel_humidity", None, None),
            "onOff" => ("switch", None, None),
            "relay" => ("switch", None, None),
            "PWM" => ("range", Some(100.0), Some("%")),
            "%" => ("range", Some(100.0), Some("%")),
            "id" => ("text", None, None),
            "picklist" => ("text", None, None),
            "minutes" => ("value", None, Some("min")),
            _ => ("value", None, None),
        };
        ControlMeta {
            display_type: mapped.to_string(),
            read_only,
            max,
            units: units.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueChangeEvent {
    pub device_id: String,
    pub control_id: String,
    pub value: String,
}
