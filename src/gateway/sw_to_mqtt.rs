//! SmartWeb→MQTT Gateway (§4.7): discovers remote programs via
//! `I_AM_PROGRAM`, polls their sensors/outputs/parameters round-robin,
//! publishes decoded values as broker controls, and turns broker-side
//! writes to writable parameters into `SET_PARAMETER_VALUE` requests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, ControlMeta, ValueChangeEvent};
use crate::bus::{Bus, FrameHandler};
use crate::codec::ValueCodec;
use crate::error::Result;
use crate::frame::header::MessageType;
use crate::frame::ids::{program_fn, program_parameter_id, program_type, remote_control_fn};
use crate::frame::{Frame, Header, IndexedParameter, UnindexedParameter};
use crate::registry::{Field, ProgramClass, Registry};
use crate::scheduler::{PeriodicTask, Scheduler};

/// Back-reference a writable broker control carries so that a value-change
/// event can be turned into a `SET_PARAMETER_VALUE` request without walking
/// the registry again. Plain ids rather than a pointer back into the class
/// tree (§9 design note: "a plain integer class id ... and a central
/// registry lookup").
#[derive(Clone)]
struct WritableParam {
    program_id: u8,
    program_type: u8,
    parameter_id: u8,
    codec: ValueCodec,
    class_name: String,
    parameter_name: String,
}

#[derive(Default)]
struct RequestList {
    requests: Vec<Frame>,
    index: usize,
}

struct Inner {
    bus: Arc<dyn Bus>,
    broker: Arc<dyn BrokerClient>,
    registry: Arc<Registry>,
    /// `program_id -> class programType`, per §3's "known program" model.
    known_programs: DashMap<u8, u8>,
    requests: Mutex<RequestList>,
    created_devices: Mutex<Vec<String>>,
    created_controls: DashMap<(String, String), ()>,
    writable_params: DashMap<(String, String), WritableParam>,
}

/// Owns the round-robin poll loop, the known-programs map, and the
/// devices/controls it has created on the broker. Registers itself as a
/// bus handler at construction and removes itself at `stop` (§3 lifecycle).
pub struct SmartWebToMqttGateway {
    inner: Arc<Inner>,
    scheduler: Mutex<Scheduler>,
    poll_interval: Duration,
}

impl SmartWebToMqttGateway {
    /// Builds the gateway, registers it as a bus handler, and installs its
    /// broker value-change callback. Does not yet poll anything — call
    /// `start` to spawn the scheduler, mirroring `MqttToSmartWebController`'s
    /// split between construction and start.
    pub fn new(bus: Arc<dyn Bus>, broker: Arc<dyn BrokerClient>, registry: Arc<Registry>, poll_interval: Duration) -> Arc<Self> {
        let inner = Arc::new(Inner {
            bus: Arc::clone(&bus),
            broker: Arc::clone(&broker),
            registry,
            known_programs: DashMap::new(),
            requests: Mutex::new(RequestList::default()),
            created_devices: Mutex::new(Vec::new()),
            created_controls: DashMap::new(),
            writable_params: DashMap::new(),
        });

        let gateway = Arc::new(SmartWebToMqttGateway {
            inner: Arc::clone(&inner),
            scheduler: Mutex::new(Scheduler::new()),
            poll_interval,
        });

        let callback_inner = Arc::clone(&inner);
        broker.on_value_change(Box::new(move |event: ValueChangeEvent| {
            callback_inner.handle_value_change(event);
        }));

        bus.add_handler(Arc::clone(&gateway) as Arc<dyn FrameHandler>);

        gateway
    }

    /// Starts the round-robin poll scheduler (§4.5, §4.7).
    pub fn start(self: &Arc<Self>) {
        let mut scheduler = self.scheduler.lock().unwrap();
        scheduler.start();
        let poll_inner = Arc::clone(&self.inner);
        let task = PeriodicTask::new("sw_to_mqtt_poll", self.poll_interval, move || poll_inner.poll_once());
        scheduler.add_task(Box::new(task));
    }

    /// Deregisters from the bus, stops the poll scheduler, and removes
    /// every device this gateway created (§4.7 "on shutdown").
    pub fn stop(self: &Arc<Self>) {
        self.inner.bus.remove_handler(&(Arc::clone(self) as Arc<dyn FrameHandler>));
        self.scheduler.lock().unwrap().stop();
        let devices = std::mem::take(&mut *self.inner.created_devices.lock().unwrap());
        for device_id in devices {
            if let Err(e) = self.inner.broker.remove_device(&device_id) {
                warn!("failed to remove device {device_id} on shutdown: {e}");
            }
        }
    }
}

impl FrameHandler for SmartWebToMqttGateway {
    fn handle(&self, frame: &Frame) -> bool {
        if frame.header.message_type != MessageType::Response {
            return false;
        }
        if frame.header.program_type == program_type::PROGRAM && frame.header.function_id == program_fn::I_AM_PROGRAM {
            self.inner.handle_i_am_program(frame);
            return true;
        }
        if frame.header.program_type == program_type::REMOTE_CONTROL && frame.header.function_id == remote_control_fn::GET_PARAMETER_VALUE {
            self.inner.handle_get_value_response(frame);
            return true;
        }
        false
    }
}

impl Inner {
    fn handle_value_change(&self, event: ValueChangeEvent) {
        let Some(param) = self.writable_params.get(&(event.device_id.clone(), event.control_id.clone())) else {
            return;
        };
        match param.codec.encode(&event.value) {
            Ok(value_bytes) => {
                let mut data = vec![param.program_type, param.parameter_id];
                data.extend_from_slice(&value_bytes);
                let header = Header::new(program_type::REMOTE_CONTROL, param.program_id, remote_control_fn::SET_PARAMETER_VALUE, MessageType::Request);
                match Frame::new(header, data) {
                    Ok(frame) => {
                        if let Err(e) = self.bus.send(frame) {
                            warn!("set value request for {}:{} failed: {e}", param.class_name, param.parameter_name);
                        }
                    }
                    Err(e) => warn!("building set value request: {e}"),
                }
            }
            Err(e) => {
                warn!(
                    "can't encode '{}' for '{}'({}):'{}': {e}",
                    event.value, param.class_name, param.program_id, param.parameter_name
                );
            }
        }
    }

    /// Discovers a program from its `I_AM_PROGRAM` response and appends its
    /// poll requests to the round-robin list (§4.7 Discovery).
    fn handle_i_am_program(&self, frame: &Frame) {
        let Some(&class_type) = frame.data.get(2) else {
            debug!("I_AM_PROGRAM payload too short");
            return;
        };
        let program_id = frame.header.program_id;
        if self.known_programs.contains_key(&program_id) {
            return;
        }
        let Some(class) = self.registry.by_type(class_type) else {
            debug!(program_id, class_type, "I_AM_PROGRAM for unknown program class type");
            return;
        };
        info!("new program '{}':{} is found", class.name, program_id);
        self.known_programs.insert(program_id, class_type);

        match self.build_requests(class, program_id) {
            Ok(new_requests) => self.requests.lock().unwrap().requests.extend(new_requests),
            Err(e) => warn!("building poll requests for '{}':{program_id}: {e}", class.name),
        }
    }

    /// One request per input, one per output of the discovered program's own
    /// class, plus one per parameter of `class` and, recursively, one per
    /// parameter of each named parent class (§4.7 / `AddRequests` in the
    /// originating driver). Inputs and outputs are NOT inherited from parent
    /// classes — only parameters are, per §4.7's discovery wording.
    fn build_requests(&self, class: &ProgramClass, program_id: u8) -> Result<Vec<Frame>> {
        let mut out = Vec::new();
        for field in class.inputs.values() {
            out.push(make_get_value_request(program_id, program_type::PROGRAM, program_parameter_id::SENSOR, Some(field.id as u8))?);
        }
        for field in class.outputs.values() {
            out.push(make_get_value_request(program_id, program_type::PROGRAM, program_parameter_id::OUTPUT, Some(field.id as u8))?);
        }
        for (owner_type, field) in self.registry.inherited_parameters(class) {
            out.push(make_get_value_request(program_id, owner_type, field.id as u8, None)?);
        }
        Ok(out)
    }

    fn poll_once(&self) {
        let frame = {
            let mut state = self.requests.lock().unwrap();
            if state.requests.is_empty() {
                return;
            }
            if state.index >= state.requests.len() {
                state.index = 0;
            }
            let frame = state.requests[state.index].clone();
            state.index += 1;
            frame
        };
        if let Err(e) = self.bus.send(frame) {
            warn!("poll request send failed: {e}");
        }
    }

    /// Routes a `GET_PARAMETER_VALUE` response by `program_id` to the
    /// known program's class, then to its input/output/parameter table
    /// depending on the payload's embedded `program_type` (§4.7 Response
    /// handling).
    fn handle_get_value_response(&self, frame: &Frame) {
        let Some(class_type) = self.known_programs.get(&frame.header.program_id).map(|r| *r) else {
            return;
        };
        let Some(&data_program_type) = frame.data.first() else {
            return;
        };

        if data_program_type == program_type::PROGRAM {
            let Ok(indexed) = IndexedParameter::decode(&frame.data) else {
                debug!("malformed indexed parameter response");
                return;
            };
            let Some(class) = self.registry.by_type(class_type) else {
                return;
            };
            match indexed.parameter_id {
                program_parameter_id::SENSOR => {
                    self.publish_field(class, &class.inputs, indexed.index as u32, &indexed.value, frame.header.program_id)
                }
                program_parameter_id::OUTPUT => {
                    self.publish_field(class, &class.outputs, indexed.index as u32, &indexed.value, frame.header.program_id)
                }
                other => debug!("unknown parameter id: {other}"),
            }
            return;
        }

        let Ok(unindexed) = UnindexedParameter::decode(&frame.data) else {
            debug!("malformed unindexed parameter response");
            return;
        };
        let Some(class) = self.registry.by_type(data_program_type) else {
            debug!(program_type = data_program_type, "unknown program type");
            return;
        };
        self.publish_field(class, &class.parameters, unindexed.parameter_id as u32, &unindexed.value, frame.header.program_id);
    }

    fn publish_field(&self, class: &ProgramClass, fields: &std::collections::BTreeMap<u32, Field>, field_id: u32, raw: &[u8], program_id: u8) {
        let Some(field) = fields.get(&field_id) else {
            debug!("unknown parameter id: {field_id}");
            return;
        };

        let device_id = format!("sw {} {}", class.name, program_id);
        self.ensure_device(&device_id, &class.name, program_id);

        match field.codec.decode(raw) {
            Ok(value) => {
                self.ensure_control(&device_id, field, class, program_id);
                if let Err(e) = self.broker.clear_error(&device_id, &field.name) {
                    warn!("clearing error on {device_id}:{}: {e}", field.name);
                }
                if let Err(e) = self.broker.publish_value(&device_id, &field.name, &value) {
                    warn!("publishing {device_id}:{}: {e}", field.name);
                }
            }
            Err(e) => {
                warn!("error reading '{}':{program_id} {}: {e}", class.name, field.name);
                self.ensure_control(&device_id, field, class, program_id);
                if let Err(e) = self.broker.set_error(&device_id, &field.name, "r") {
                    warn!("setting error on {device_id}:{}: {e}", field.name);
                }
            }
        }
    }

    fn ensure_device(&self, device_id: &str, class_name: &str, program_id: u8) {
        let mut devices = self.created_devices.lock().unwrap();
        if devices.iter().any(|d| d == device_id) {
            return;
        }
        if let Err(e) = self.broker.ensure_device(device_id, device_id) {
            warn!("creating device '{device_id}' for program '{class_name}':{program_id}: {e}");
            return;
        }
        devices.push(device_id.to_string());
    }

    fn ensure_control(&self, device_id: &str, field: &Field, class: &ProgramClass, program_id: u8) {
        let key = (device_id.to_string(), field.name.clone());
        if self.created_controls.contains_key(&key) {
            return;
        }
        let meta = ControlMeta::from_display_type(&field.display_type, field.read_only);
        if let Err(e) = self.broker.ensure_control(device_id, &field.name, &meta) {
            warn!("creating control '{}' on '{device_id}': {e}", field.name);
            return;
        }
        self.created_controls.insert(key.clone(), ());
        if !field.read_only {
            self.writable_params.insert(
                key,
                WritableParam {
                    program_id,
                    program_type: class.program_type,
                    parameter_id: field.id as u8,
                    codec: field.codec.clone(),
                    class_name: class.name.clone(),
                    parameter_name: field.name.clone(),
                },
            );
        }
    }
}

fn make_get_value_request(program_id: u8, payload_program_type: u8, parameter_id: u8, index: Option<u8>) -> Result<Frame> {
    let header = Header::new(program_type::REMOTE_CONTROL, program_id, remote_control_fn::GET_PARAMETER_VALUE, MessageType::Request);
    let data = match index {
        Some(idx) => IndexedParameter {
            program_type: payload_program_type,
            parameter_id,
            index: idx,
            value: Vec::new(),
        }
        .encode(),
        None => UnindexedParameter {
            program_type: payload_program_type,
            parameter_id,
            value: Vec::new(),
        }
        .encode(),
    };
    Frame::new(header, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ControlMeta as Meta;
    use std::sync::Mutex as StdMutex;

    struct MockBus {
        sent: StdMutex<Vec<Frame>>,
        handlers: StdMutex<Vec<Arc<dyn FrameHandler>>>,
    }

    impl Bus for MockBus {
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
    struct MockBroker {
        values: DashMap<(String, String), String>,
        errors: DashMap<(String, String), String>,
        removed: StdMutex<Vec<String>>,
        change_cb: Mutex<Option<Box<dyn Fn(ValueChangeEvent) + Send + Sync>>>,
    }

    impl BrokerClient for MockBroker {
        fn ensure_device(&self, _device_id: &str, _name: &str) -> Result<()> {
            Ok(())
        }
        fn ensure_control(&self, _device_id: &str, _control_id: &str, _meta: &Meta) -> Result<()> {
            Ok(())
        }
        fn publish_value(&self, device_id: &str, control_id: &str, value: &str) -> Result<()> {
            self.values.insert((device_id.to_string(), control_id.to_string()), value.to_string());
            Ok(())
        }
        fn read_value(&self, device_id: &str, control_id: &str) -> Result<Option<String>> {
            Ok(self.values.get(&(device_id.to_string(), control_id.to_string())).map(|v| v.clone()))
        }
        fn set_error(&self, device_id: &str, control_id: &str, error: &str) -> Result<()> {
            self.errors.insert((device_id.to_string(), control_id.to_string()), error.to_string());
            Ok(())
        }
        fn clear_error(&self, _device_id: &str, _control_id: &str) -> Result<()> {
            Ok(())
        }
        fn remove_device(&self, device_id: &str) -> Result<()> {
            self.removed.lock().unwrap().push(device_id.to_string());
            Ok(())
        }
        fn on_value_change(&self, callback: Box<dyn Fn(ValueChangeEvent) + Send + Sync>) {
            *self.change_cb.lock().unwrap() = Some(callback);
        }
    }

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::load(None).unwrap())
    }

    fn make_i_am_program(program_id: u8, class_type: u8) -> Frame {
        let header = Header::new(program_type::PROGRAM, program_id, program_fn::I_AM_PROGRAM, MessageType::Response);
        Frame::new(header, vec![0, 0, class_type]).unwrap()
    }

    #[test]
    fn scenario_e_discovery_enqueues_inputs_outputs_and_parameters() {
        let bus = Arc::new(MockBus { sent: StdMutex::new(Vec::new()), handlers: StdMutex::new(Vec::new()) });
        let broker = Arc::new(MockBroker::default());
        let gateway = SmartWebToMqttGateway::new(
            bus.clone() as Arc<dyn Bus>,
            broker.clone() as Arc<dyn BrokerClient>,
            registry(),
            Duration::from_secs(3600),
        );

        assert!(gateway.handle(&make_i_am_program(10, 5)));

        let state = gateway.inner.requests.lock().unwrap();
        // ROOM_DEVICE: 2 inputs + 2 outputs + 3 parameters = 7 requests.
        assert_eq!(state.requests.len(), 7);
        assert!(state.requests.iter().all(|f| f.header.function_id == remote_control_fn::GET_PARAMETER_VALUE));
    }

    #[test]
    fn duplicate_i_am_program_is_ignored() {
        let bus = Arc::new(MockBus { sent: StdMutex::new(Vec::new()), handlers: StdMutex::new(Vec::new()) });
        let broker = Arc::new(MockBroker::default());
        let gateway = SmartWebToMqttGateway::new(
            bus.clone() as Arc<dyn Bus>,
            broker.clone() as Arc<dyn BrokerClient>,
            registry(),
            Duration::from_secs(3600),
        );

        assert!(gateway.handle(&make_i_am_program(10, 5)));
        assert!(gateway.handle(&make_i_am_program(10, 5)));
        assert_eq!(gateway.inner.requests.lock().unwrap().requests.len(), 7);
    }

    #[test]
    fn publishes_decoded_sensor_value_and_survives_sensor_error() {
        let bus = Arc::new(MockBus { sent: StdMutex::new(Vec::new()), handlers: StdMutex::new(Vec::new()) });
        let broker = Arc::new(MockBroker::default());
        let gateway = SmartWebToMqttGateway::new(
            bus.clone() as Arc<dyn Bus>,
            broker.clone() as Arc<dyn BrokerClient>,
            registry(),
            Duration::from_secs(3600),
        );
        gateway.handle(&make_i_am_program(10, 5));

        let ok_header = Header::new(program_type::REMOTE_CONTROL, 10, remote_control_fn::GET_PARAMETER_VALUE, MessageType::Response);
        let ok_payload = IndexedParameter {
            program_type: program_type::PROGRAM,
            parameter_id: program_parameter_id::SENSOR,
            index: 0,
            value: 234i16.to_le_bytes().to_vec(),
        }
        .encode();
        assert!(gateway.handle(&Frame::new(ok_header, ok_payload).unwrap()));
        assert_eq!(
            broker.values.get(&("sw ROOM_DEVICE 10".to_string(), "roomTemperature".to_string())).map(|v| v.clone()),
            Some("23.4".to_string())
        );

        let err_header = Header::new(program_type::REMOTE_CONTROL, 10, remote_control_fn::GET_PARAMETER_VALUE, MessageType::Response);
        let err_payload = IndexedParameter {
            program_type: program_type::PROGRAM,
            parameter_id: program_parameter_id::SENSOR,
            index: 0,
            value: (-32768i16).to_le_bytes().to_vec(),
        }
        .encode();
        gateway.handle(&Frame::new(err_header, err_payload).unwrap());
        assert_eq!(
            broker.errors.get(&("sw ROOM_DEVICE 10".to_string(), "roomTemperature".to_string())).map(|v| v.clone()),
            Some("r".to_string())
        );
    }

    #[test]
    fn scenario_d_value_change_produces_set_parameter_value_request() {
        let bus = Arc::new(MockBus { sent: StdMutex::new(Vec::new()), handlers: StdMutex::new(Vec::new()) });
        let broker = Arc::new(MockBroker::default());
        let gateway = SmartWebToMqttGateway::new(
            bus.clone() as Arc<dyn Bus>,
            broker.clone() as Arc<dyn BrokerClient>,
            registry(),
            Duration::from_secs(3600),
        );
        gateway.handle(&make_i_am_program(10, 5));

        // Force-publish the writable parameter once so ensure_control runs
        // and registers the back-reference (as a live poll response would).
        let param_header = Header::new(program_type::REMOTE_CONTROL, 10, remote_control_fn::GET_PARAMETER_VALUE, MessageType::Response);
        let param_payload = UnindexedParameter {
            program_type: 5,
            parameter_id: 2,
            value: 100i16.to_le_bytes().to_vec(),
        }
        .encode();
        gateway.handle(&Frame::new(param_header, param_payload).unwrap());

        let callback = broker.change_cb.lock().unwrap().take().unwrap();
        callback(ValueChangeEvent {
            device_id: "sw ROOM_DEVICE 10".to_string(),
            control_id: "roomReducedTemperature".to_string(),
            value: "11.1".to_string(),
        });

        let sent = bus.sent.lock().unwrap();
        let request = sent.last().expect("a SET_PARAMETER_VALUE request was sent");
        assert_eq!(request.header.program_type, program_type::REMOTE_CONTROL);
        assert_eq!(request.header.program_id, 10);
        assert_eq!(request.header.function_id, remote_control_fn::SET_PARAMETER_VALUE);
        assert_eq!(request.data, vec![0x05, 0x02, 0x6F, 0x00]);
    }
}
