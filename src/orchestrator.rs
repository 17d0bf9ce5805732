//! Orchestrator (§4.8): owns the bus port, the single SW→MQTT gateway, and
//! one MQTT→SW controller per configured controller id, and drives
//! signal-bound startup/shutdown the way the original driver's `main`
//! does (60s init timeout, 10s stop timeout, ordered teardown).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::broker::BrokerClient;
use crate::bus::{Bus, FrameHandler};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::{FreshnessRegistry, MqttToSmartWebController, SmartWebToMqttGateway};
use crate::registry::Registry;

const INIT_TIMEOUT: Duration = Duration::from_secs(60);
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Orchestrator {
    bus: Arc<dyn Bus>,
    sw_gateway: Arc<SmartWebToMqttGateway>,
    controllers: Vec<Arc<MqttToSmartWebController>>,
}

impl Orchestrator {
    /// Builds every component but starts nothing yet (§4.8's construction
    /// order: one `SmartWebToMqttGateway`, then one controller per
    /// configured id).
    pub fn build(config: &Config, bus: Arc<dyn Bus>, broker: Arc<dyn BrokerClient>, registry: Arc<Registry>) -> Result<Self> {
        let freshness = Arc::new(FreshnessRegistry::new());
        FreshnessRegistry::install(Arc::clone(&freshness), &broker);

        let poll_interval = Duration::from_millis(config.poll_interval_ms as u64);
        let sw_gateway = SmartWebToMqttGateway::new(Arc::clone(&bus), Arc::clone(&broker), registry, poll_interval);

        let mut controllers = Vec::with_capacity(config.controllers.len());
        for controller_config in &config.controllers {
            let controller = MqttToSmartWebController::new(controller_config, Arc::clone(&bus), Arc::clone(&broker), Arc::clone(&freshness))?;
            controllers.push(controller);
        }

        Ok(Orchestrator { bus, sw_gateway, controllers })
    }

    pub fn start(&self) {
        self.sw_gateway.start();
        for controller in &self.controllers {
            controller.start();
        }
    }

    /// Deregisters and stops every gateway, in reverse construction order
    /// (controllers before the discovery gateway, mirroring the original's
    /// block-scoped destructor ordering).
    fn stop(&mut self) {
        for controller in &self.controllers {
            let handler: Arc<dyn FrameHandler> = Arc::clone(controller) as Arc<dyn FrameHandler>;
            self.bus.remove_handler(&handler);
            controller.stop();
        }
        self.sw_gateway.stop();
    }

    /// Installs the SIGINT/SIGTERM handler, starts every component bounded
    /// by the init timeout, blocks until a signal arrives, then stops
    /// everything bounded by the stop timeout. Returns the process exit
    /// code (§6: 0 clean, 1 fatal/timeout, 2 usage — usage errors are
    /// produced by the caller before this runs).
    pub fn run(mut self) -> i32 {
        let ready = Arc::new(AtomicBool::new(false));
        {
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                thread::sleep(INIT_TIMEOUT);
                if !ready.load(Ordering::SeqCst) {
                    error!("driver takes too long to initialize, exiting");
                    std::process::exit(1);
                }
            });
        }

        let (tx, rx) = mpsc::channel();
        if let Err(e) = ctrlc::set_handler(move || {
            let _ = tx.send(());
        }) {
            error!("failed to install signal handler: {e}");
            return 1;
        }

        self.start();
        ready.store(true, Ordering::SeqCst);
        info!("smartweb-gateway ready");

        if rx.recv().is_err() {
            error!("signal channel closed unexpectedly");
            return 1;
        }

        info!("shutdown signal received, stopping");
        self.stop_bounded()
    }

    fn stop_bounded(mut self) -> i32 {
        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            self.stop();
            let _ = done_tx.send(());
        });

        match done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) => {
                let _ = handle.join();
                0
            }
            Err(_) => {
                error!("driver takes too long to stop, exiting");
                1
            }
        }
    }
}
