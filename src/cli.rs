//! Command line surface (§6, §0.4): flags mirroring the original driver's
//! `getopt` parsing, ported to a `clap` derive `Parser`.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "smartweb-gateway",
    version = env!("CARGO_PKG_VERSION"),
    about = "SmartWeb CAN bus <-> MQTT broker gateway",
    long_about = "Bidirectionally bridges a SmartWeb CAN bus to an MQTT-style broker: virtual controllers for broker-side writes, and discovered program polling for broker-side reads."
)]
pub struct Args {
    /// Configuration file path.
    #[arg(short = 'c', long = "config")]
    pub config: std::path::PathBuf,

    /// CAN bus interface name.
    #[arg(short = 'i', long = "interface", default_value = "can0")]
    pub interface: String,

    /// Broker port.
    #[arg(short = 'p', long = "port", default_value_t = 1883)]
    pub port: u16,

    /// Broker host.
    #[arg(short = 'h', short_alias = 'H', long = "host", default_value = "localhost")]
    pub host: String,

    /// Broker username.
    #[arg(short = 'u', long = "user")]
    pub username: Option<String>,

    /// Broker password.
    #[arg(short = 'P', long = "password")]
    pub password: Option<String>,

    /// Broker topic prefix.
    #[arg(short = 'T', long = "topic-prefix", default_value = "")]
    pub topic_prefix: String,

    /// Debug level in [-3, 3]; see `logging::init` for the exact mapping.
    #[arg(short = 'd', long = "debug", default_value_t = 0, allow_negative_numbers = true)]
    pub debug: i32,
}

impl Args {
    /// Validates `-d`'s range, matching the original's usage-error behavior
    /// for anything outside the recognized switch cases.
    pub fn validate_debug_level(&self) -> Result<(), String> {
        if (-3..=3).contains(&self.debug) {
            Ok(())
        } else {
            Err(format!("Invalid -d parameter value: {}", self.debug))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_debug_level() {
        let args = Args {
            config: "gateway.conf".into(),
            interface: "can0".into(),
            port: 1883,
            host: "localhost".into(),
            username: None,
            password: None,
            topic_prefix: String::new(),
            debug: 4,
        };
        assert!(args.validate_debug_level().is_err());
    }

    #[test]
    fn accepts_boundary_debug_levels() {
        for level in -3..=3 {
            let args = Args {
                config: "gateway.conf".into(),
                interface: "can0".into(),
                port: 1883,
                host: "localhost".into(),
                username: None,
                password: None,
                topic_prefix: String::new(),
                debug: level,
            };
            assert!(args.validate_debug_level().is_ok());
        }
    }
}
