//! Entry point: parses the CLI, loads configuration, opens the CAN bus and
//! broker connections, and runs the orchestrator until a shutdown signal
//! arrives (§4.8, §6).

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use smartweb_gateway::bus::{Bus, BusPort};
use smartweb_gateway::broker::{BrokerClient, MqttBrokerClient};
use smartweb_gateway::cli::Args;
use smartweb_gateway::config::{load_config, user_class_directory};
use smartweb_gateway::logging;
use smartweb_gateway::orchestrator::Orchestrator;
use smartweb_gateway::registry::Registry;

fn main() {
    let args = Args::parse();

    if let Err(msg) = args.validate_debug_level() {
        eprintln!("{msg}");
        std::process::exit(2);
    }

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            // Logging isn't initialized yet; a config load failure is
            // reported directly, matching the original's pre-logger catch.
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    logging::init(logging::effective_level(args.debug, config.debug));

    info!("smartweb-gateway {} starting", env!("CARGO_PKG_VERSION"));

    let registry = match Registry::load(Some(&user_class_directory(&args.config))) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("FATAL: loading program-class registry: {e}");
            std::process::exit(1);
        }
    };

    let bus: Arc<dyn Bus> = match BusPort::open(&args.interface) {
        Ok(port) => Arc::new(port) as Arc<dyn Bus>,
        Err(e) => {
            error!("FATAL: opening CAN interface {}: {e}", args.interface);
            std::process::exit(1);
        }
    };

    let client_id = format!("smartweb-gateway-{}", std::process::id());
    let broker: Arc<dyn BrokerClient> = match MqttBrokerClient::connect(
        &args.host,
        args.port,
        &client_id,
        args.username.as_deref(),
        args.password.as_deref(),
        &args.topic_prefix,
    ) {
        Ok(client) => Arc::new(client) as Arc<dyn BrokerClient>,
        Err(e) => {
            error!("FATAL: connecting to broker at {}:{}: {e}", args.host, args.port);
            std::process::exit(1);
        }
    };

    let orchestrator = match Orchestrator::build(&config, bus, broker, registry) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("FATAL: building gateway: {e}");
            std::process::exit(1);
        }
    };

    std::process::exit(orchestrator.run());
}
