//! Value Codecs (§4.3): the trait family translating typed broker strings to
//! and from SmartWeb byte payloads.
//!
//! Each variant is a closed, data-carrying enum case rather than a trait
//! object behind a heap pointer — construction happens once, at
//! configuration time, in the program-class registry, and codecs are held
//! by value from then on.

use crate::error::{GatewayError, Result};
use crate::frame::ids::sensor_sentinel;

/// Common behavior shared by every codec variant.
pub trait CodecOps {
    fn decode(&self, bytes: &[u8]) -> Result<String>;
    fn encode(&self, value: &str) -> Result<Vec<u8>>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueCodec {
    IntDivisor(IntDivisorCodec),
    Enum(EnumCodec),
    Sensor(SensorCodec),
    OnOffSensor(OnOffSensorCodec),
    Pwm(PwmCodec),
    OutputBit(OutputBitCodec),
}

impl ValueCodec {
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            ValueCodec::IntDivisor(c) => c.decode(bytes),
            ValueCodec::Enum(c) => c.decode(bytes),
            ValueCodec::Sensor(c) => c.decode(bytes),
            ValueCodec::OnOffSensor(c) => c.decode(bytes),
            ValueCodec::Pwm(c) => c.decode(bytes),
            ValueCodec::OutputBit(c) => c.decode(bytes),
        }
    }

    pub fn encode(&self, value: &str) -> Result<Vec<u8>> {
        match self {
            ValueCodec::IntDivisor(c) => c.encode(value),
            ValueCodec::Enum(c) => c.encode(value),
            ValueCodec::Sensor(c) => c.encode(value),
            ValueCodec::OnOffSensor(c) => c.encode(value),
            ValueCodec::Pwm(c) => c.encode(value),
            ValueCodec::OutputBit(c) => c.encode(value),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueCodec::IntDivisor(c) => c.name(),
            ValueCodec::Enum(c) => c.name(),
            ValueCodec::Sensor(c) => c.name(),
            ValueCodec::OnOffSensor(c) => c.name(),
            ValueCodec::Pwm(c) => c.name(),
            ValueCodec::OutputBit(c) => c.name(),
        }
    }

    /// The codec used when a parameter declares no `encoding` at all (§4.3).
    pub fn default_parameter_codec() -> Self {
        ValueCodec::IntDivisor(IntDivisorCodec {
            signed: true,
            width: 2,
            divisor: 10.0,
        })
    }
}

fn format_fixed(value: f64, divisor: f64) -> String {
    let digits = divisor.log10().ceil().max(0.0) as usize;
    let mut s = format!("{value:.digits$}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

fn read_int(bytes: &[u8], signed: bool, width: usize) -> Result<i64> {
    if bytes.len() < width {
        return Err(GatewayError::frame("value payload shorter than codec width"));
    }
    let mut raw: u64 = 0;
    for (i, b) in bytes[..width].iter().enumerate() {
        raw |= (*b as u64) << (8 * i);
    }
    if signed {
        let shift = 64 - width * 8;
        Ok(((raw << shift) as i64) >> shift)
    } else {
        Ok(raw as i64)
    }
}

fn write_int(value: i64, width: usize) -> Vec<u8> {
    let raw = value as u64;
    (0..width).map(|i| ((raw >> (8 * i)) & 0xFF) as u8).collect()
}

/// Signed/unsigned integer with a fixed divisor, width 1/2/4 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntDivisorCodec {
    pub signed: bool,
    pub width: usize,
    pub divisor: f64,
}

impl CodecOps for IntDivisorCodec {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let raw = read_int(bytes, self.signed, self.width)?;
        Ok(format_fixed(raw as f64 / self.divisor, self.divisor))
    }

    fn encode(&self, value: &str) -> Result<Vec<u8>> {
        let parsed: f64 = value
            .parse()
            .map_err(|_| GatewayError::driver(format!("cannot parse '{value}' as number")))?;
        let scaled = (parsed * self.divisor).trunc() as i64;
        Ok(write_int(scaled, self.width))
    }

    fn name(&self) -> &'static str {
        "int_divisor"
    }
}

/// A finite `u8 -> string` map.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumCodec {
    pub values: std::collections::BTreeMap<u8, String>,
}

impl CodecOps for EnumCodec {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let byte = *bytes.first().ok_or_else(|| GatewayError::frame("enum payload empty"))?;
        Ok(self
            .values
            .get(&byte)
            .cloned()
            .unwrap_or_else(|| byte.to_string()))
    }

    fn encode(&self, value: &str) -> Result<Vec<u8>> {
        self.values
            .iter()
            .find(|(_, label)| label.as_str() == value)
            .map(|(byte, _)| vec![*byte])
            .ok_or_else(|| GatewayError::driver(format!("unknown value '{value}' for enum codec")))
    }

    fn name(&self) -> &'static str {
        "enum"
    }
}

/// Signed 16 / divisor 10, with the three reserved sentinels raising a
/// sensor-error instead of decoding as a number. Sensors are read-only: a
/// program's inputs are never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorCodec;

impl CodecOps for SensorCodec {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let raw = read_int(bytes, true, 2)? as i16;
        match raw {
            sensor_sentinel::SHORT_CIRCUIT => Err(GatewayError::driver("sensor short-circuit")),
            sensor_sentinel::OPEN => Err(GatewayError::driver("sensor open")),
            sensor_sentinel::UNDEFINED => Err(GatewayError::driver("sensor undefined")),
            v => Ok(format_fixed(v as f64 / 10.0, 10.0)),
        }
    }

    fn encode(&self, _value: &str) -> Result<Vec<u8>> {
        Err(GatewayError::unsupported("sensors are read-only"))
    }

    fn name(&self) -> &'static str {
        "sensor"
    }
}

/// Signed 16, where the short-circuit/open sentinels collapse to "1"/"0"
/// and the undefined sentinel raises; any other value passes through
/// unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnOffSensorCodec;

impl CodecOps for OnOffSensorCodec {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let raw = read_int(bytes, true, 2)? as i16;
        match raw {
            sensor_sentinel::SHORT_CIRCUIT => Ok("1".to_string()),
            sensor_sentinel::OPEN => Ok("0".to_string()),
            sensor_sentinel::UNDEFINED => Err(GatewayError::driver("on/off sensor undefined")),
            v => Ok(v.to_string()),
        }
    }

    fn encode(&self, _value: &str) -> Result<Vec<u8>> {
        Err(GatewayError::unsupported("on/off sensors are read-only"))
    }

    fn name(&self) -> &'static str {
        "on_off_sensor"
    }
}

/// Unsigned byte: 255 maps to 100 (percent), otherwise `byte / 2.54`.
/// Outputs are read-only in the SW→MQTT direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmCodec;

impl CodecOps for PwmCodec {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let byte = *bytes.first().ok_or_else(|| GatewayError::frame("pwm payload empty"))?;
        if byte == 255 {
            Ok("100".to_string())
        } else {
            Ok(format_fixed(byte as f64 / 2.54, 100.0))
        }
    }

    fn encode(&self, _value: &str) -> Result<Vec<u8>> {
        Err(GatewayError::unsupported("pwm outputs are read-only"))
    }

    fn name(&self) -> &'static str {
        "pwm"
    }
}

/// Unsigned byte: 0 decodes to "0", anything else to "1".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBitCodec;

impl CodecOps for OutputBitCodec {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let byte = *bytes.first().ok_or_else(|| GatewayError::frame("output payload empty"))?;
        Ok(if byte == 0 { "0" } else { "1" }.to_string())
    }

    fn encode(&self, _value: &str) -> Result<Vec<u8>> {
        Err(GatewayError::unsupported("output bits are read-only"))
    }

    fn name(&self) -> &'static str {
        "output_bit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_divisor_round_trips_scenario_d() {
        let codec = ValueCodec::default_parameter_codec();
        let encoded = codec.encode("11.1").unwrap();
        assert_eq!(encoded, vec![0x6F, 0x00]);
        assert_eq!(codec.decode(&encoded).unwrap(), "11.1");
    }

    #[test]
    fn sensor_decodes_scenario_b_value() {
        let codec = SensorCodec;
        assert_eq!(codec.decode(&[0xEA, 0x00]).unwrap(), "23.4");
    }

    #[test]
    fn sensor_sentinels_raise() {
        let codec = SensorCodec;
        assert!(codec.decode(&(-32768i16).to_le_bytes()).is_err());
        assert!(codec.decode(&(-32767i16).to_le_bytes()).is_err());
        assert!(codec.decode(&(-32766i16).to_le_bytes()).is_err());
    }

    #[test]
    fn on_off_sensor_maps_short_and_open() {
        let codec = OnOffSensorCodec;
        assert_eq!(codec.decode(&(-32768i16).to_le_bytes()).unwrap(), "1");
        assert_eq!(codec.decode(&(-32767i16).to_le_bytes()).unwrap(), "0");
        assert!(codec.decode(&(-32766i16).to_le_bytes()).is_err());
    }

    #[test]
    fn pwm_full_scale_is_100() {
        let codec = PwmCodec;
        assert_eq!(codec.decode(&[255]).unwrap(), "100");
    }

    #[test]
    fn output_bit_decodes_zero_and_nonzero() {
        let codec = OutputBitCodec;
        assert_eq!(codec.decode(&[0]).unwrap(), "0");
        assert_eq!(codec.decode(&[7]).unwrap(), "1");
    }

    #[test]
    fn enum_unknown_byte_falls_back_to_decimal() {
        let mut values = std::collections::BTreeMap::new();
        values.insert(1, "on".to_string());
        let codec = EnumCodec { values };
        assert_eq!(codec.decode(&[9]).unwrap(), "9");
        assert!(codec.encode("off").is_err());
    }
}
