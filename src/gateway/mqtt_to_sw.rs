//! MQTT→SmartWeb Gateway (§4.6): one worker per configured virtual
//! controller, serving CAN requests addressed to it and scheduling
//! broadcast of output values it has been asked for.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, ValueChangeEvent};
use crate::bus::{Bus, FrameHandler};
use crate::codec::{IntDivisorCodec, ValueCodec};
use crate::config::ControllerConfig;
use crate::error::{GatewayError, Result};
use crate::frame::header::MessageType;
use crate::frame::ids::{controller_fn, program_parameter_id, program_type, remote_control_fn, EXTENDED_CONTROLLER_HW_TYPE, SENSOR_UNDEFINED_WORD};
use crate::frame::{Frame, Header, IndexedParameter, MappingPoint};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const OUTPUT_BROADCAST_WINDOW: Duration = Duration::from_secs(10 * 60);
const OUTPUT_BROADCAST_PERIOD: Duration = Duration::from_secs(1);
const QUEUE_WAIT: Duration = Duration::from_secs(1);

/// Tracks, per mapped broker control, the timestamp of its last
/// value-change event, shared across every controller. The broker's
/// `on_value_change` filter is installed against this registry exactly
/// once by the orchestrator, regardless of how many controllers exist.
#[derive(Default)]
pub struct FreshnessRegistry {
    last_update: DashMap<(String, String), Instant>,
}

impl FreshnessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, device_id: &str, control_id: &str) {
        self.last_update.insert((device_id.to_string(), control_id.to_string()), Instant::now());
    }

    pub fn register(&self, device_id: &str, control_id: &str) {
        self.last_update.entry((device_id.to_string(), control_id.to_string())).or_insert_with(Instant::now);
    }

    pub fn is_fresh(&self, device_id: &str, control_id: &str, timeout_min: i32) -> bool {
        if timeout_min < 0 {
            return true;
        }
        match self.last_update.get(&(device_id.to_string(), control_id.to_string())) {
            Some(last) => last.elapsed() <= Duration::from_secs(timeout_min as u64 * 60),
            None => false,
        }
    }

    /// Installs the shared value-change listener on `broker`. Call once.
    pub fn install(registry: Arc<FreshnessRegistry>, broker: &Arc<dyn BrokerClient>) {
        broker.on_value_change(Box::new(move |event: ValueChangeEvent| {
            registry.touch(&event.device_id, &event.control_id);
        }));
    }
}

struct ParamMappingEntry {
    device_id: String,
    control_id: String,
    value_timeout_min: i32,
}

#[derive(Clone)]
struct OutputSlot {
    device_id: String,
    control_id: String,
    send_time: Option<Instant>,
    send_end_time: Option<Instant>,
    mapping_point: Option<MappingPoint>,
}

impl OutputSlot {
    fn new(device_id: String, control_id: String) -> Self {
        OutputSlot {
            device_id,
            control_id,
            send_time: None,
            send_end_time: None,
            mapping_point: None,
        }
    }
}

enum ControllerState {
    Idle { next_iam_here: Instant },
    Running { reset_connection_time: Instant },
}

struct Inner {
    id: u8,
    bus: Arc<dyn Bus>,
    broker: Arc<dyn BrokerClient>,
    freshness: Arc<FreshnessRegistry>,
    parameter_mapping: HashMap<u32, ParamMappingEntry>,
    output_mapping: Mutex<Vec<Option<OutputSlot>>>,
    parameter_count: usize,
    state: Mutex<ControllerState>,
    value_codec: IntDivisorCodec,
}

/// Claims inbound frames for its controller and queues them for the
/// dedicated worker thread; the queue wait has a 1-second timeout so
/// scheduled work (keep-alive, output broadcasts, connection timeout)
/// still runs in the absence of traffic.
pub struct MqttToSmartWebController {
    inner: Arc<Inner>,
    queue: Arc<(Mutex<VecDeque<Frame>>, Condvar)>,
    enabled: Arc<AtomicBool>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl MqttToSmartWebController {
    pub fn new(
        config: &ControllerConfig,
        bus: Arc<dyn Bus>,
        broker: Arc<dyn BrokerClient>,
        freshness: Arc<FreshnessRegistry>,
    ) -> Result<Arc<Self>> {
        let mut parameter_mapping = HashMap::new();
        let mut output_mapping: Vec<Option<OutputSlot>> = vec![None; 32];

        for sensor in &config.sensors {
            let (device_id, control_id) = crate::config::types::split_channel(&sensor.channel)
                .ok_or_else(|| GatewayError::config(format!("invalid channel '{}'", sensor.channel)))?;
            let raw_info = crate::frame::raw_info(program_type::CONTROLLER, program_parameter_id::SENSOR, sensor.sensor_index);
            parameter_mapping.insert(
                raw_info,
                ParamMappingEntry {
                    device_id: device_id.to_string(),
                    control_id: control_id.to_string(),
                    value_timeout_min: sensor.value_timeout_min.unwrap_or(-1),
                },
            );
            freshness.register(device_id, control_id);

            // Sensor-to-output aliasing (§0.6 item 3): a sensor at index N
            // is also advertised as output N-1. Surfaced via a warning
            // rather than silently relied on, per the open question.
            if sensor.sensor_index == 0 {
                warn!(
                    controller_id = config.controller_id,
                    "sensor index 0 cannot alias to output index -1, skipping aliasing"
                );
            } else {
                let output_index = (sensor.sensor_index - 1) as usize;
                if output_index < 32 {
                    warn!(
                        controller_id = config.controller_id,
                        sensor_index = sensor.sensor_index,
                        output_index,
                        "aliasing sensor onto output channel"
                    );
                    output_mapping[output_index] = Some(OutputSlot::new(device_id.to_string(), control_id.to_string()));
                }
            }
        }

        for param in &config.parameters {
            let (device_id, control_id) = crate::config::types::split_channel(&param.channel)
                .ok_or_else(|| GatewayError::config(format!("invalid channel '{}'", param.channel)))?;
            let raw_info = crate::frame::raw_info(param.program_type, param.parameter_id, param.parameter_index);
            parameter_mapping.insert(
                raw_info,
                ParamMappingEntry {
                    device_id: device_id.to_string(),
                    control_id: control_id.to_string(),
                    value_timeout_min: param.value_timeout_min.unwrap_or(-1),
                },
            );
            freshness.register(device_id, control_id);
        }

        for output in &config.outputs {
            let (device_id, control_id) = crate::config::types::split_channel(&output.channel)
                .ok_or_else(|| GatewayError::config(format!("invalid channel '{}'", output.channel)))?;
            if output.output_index as usize >= 32 {
                return Err(GatewayError::config(format!("output_index {} out of range", output.output_index)));
            }
            freshness.register(device_id, control_id);
            output_mapping[output.output_index as usize] = Some(OutputSlot::new(device_id.to_string(), control_id.to_string()));
        }

        let inner = Arc::new(Inner {
            id: config.controller_id,
            bus,
            broker,
            freshness,
            parameter_count: config.parameters.len(),
            parameter_mapping,
            output_mapping: Mutex::new(output_mapping),
            state: Mutex::new(ControllerState::Idle { next_iam_here: Instant::now() }),
            value_codec: IntDivisorCodec { signed: true, width: 2, divisor: 10.0 },
        });

        let controller = Arc::new(MqttToSmartWebController {
            inner,
            queue: Arc::new((Mutex::new(VecDeque::new()), Condvar::new())),
            enabled: Arc::new(AtomicBool::new(true)),
            thread: Mutex::new(None),
        });

        controller.bus_ref().add_handler(Arc::clone(&controller) as Arc<dyn FrameHandler>);
        Ok(controller)
    }

    fn bus_ref(&self) -> &Arc<dyn Bus> {
        &self.inner.bus
    }

    pub fn start(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        let queue = Arc::clone(&self.queue);
        let enabled = Arc::clone(&self.enabled);
        let handle = std::thread::spawn(move || controller.run(queue, enabled));
        *self.thread.lock().unwrap() = Some(handle);
    }

    fn run(self: Arc<Self>, queue: Arc<(Mutex<VecDeque<Frame>>, Condvar)>, enabled: Arc<AtomicBool>) {
        while enabled.load(Ordering::SeqCst) {
            let frame = {
                let (lock, cvar) = &*queue;
                let mut guard = lock.lock().unwrap();
                if guard.is_empty() {
                    let (new_guard, _) = cvar.wait_timeout(guard, QUEUE_WAIT).unwrap();
                    guard = new_guard;
                }
                guard.pop_front()
            };

            if let Some(frame) = frame {
                self.on_frame_for_me(&frame);
            }

            self.service_scheduled_work();
        }
    }

    fn on_frame_for_me(&self, frame: &Frame) {
        let mut state = self.inner.state.lock().unwrap();
        match &*state {
            ControllerState::Idle { .. } => {
                info!(controller_id = self.inner.id, "connection established");
                *state = ControllerState::Running {
                    reset_connection_time: Instant::now() + CONNECTION_TIMEOUT,
                };
            }
            ControllerState::Running { .. } => {
                *state = ControllerState::Running {
                    reset_connection_time: Instant::now() + CONNECTION_TIMEOUT,
                };
            }
        }
        drop(state);

        if frame.header.message_type != MessageType::Request {
            return;
        }

        match self.dispatch_request(frame) {
            Ok(Some(response)) => {
                if let Err(e) = self.inner.bus.send(response) {
                    warn!(controller_id = self.inner.id, "failed to send response: {e}");
                }
            }
            Ok(None) => {}
            Err(GatewayError::Unsupported(msg)) => {
                debug!(controller_id = self.inner.id, "unsupported request: {msg}");
            }
            Err(e) => {
                warn!(controller_id = self.inner.id, "error handling request: {e}");
            }
        }
    }

    fn dispatch_request(&self, frame: &Frame) -> Result<Option<Frame>> {
        match frame.header.program_type {
            program_type::CONTROLLER => self.dispatch_controller_request(frame),
            program_type::REMOTE_CONTROL => self.dispatch_remote_control_request(frame),
            other => Err(GatewayError::unsupported(format!("non-controller program type {other}"))),
        }
    }

    fn dispatch_controller_request(&self, frame: &Frame) -> Result<Option<Frame>> {
        match frame.header.function_id {
            controller_fn::I_AM_HERE => {
                let response = Frame::response_to(frame, vec![EXTENDED_CONTROLLER_HW_TYPE])?;
                Ok(Some(response))
            }
            controller_fn::GET_CHANNEL_NUMBER => {
                let count = self.inner.parameter_count.max(self.inner.parameter_mapping.len()) as u16;
                let response = Frame::response_to(frame, count.to_le_bytes().to_vec())?;
                Ok(Some(response))
            }
            controller_fn::GET_CONTROLLER_TYPE => {
                let response = Frame::response_to(frame, vec![EXTENDED_CONTROLLER_HW_TYPE])?;
                Ok(Some(response))
            }
            controller_fn::GET_OUTPUT_VALUE => {
                self.schedule_output_broadcast(frame)?;
                Ok(None)
            }
            other => Err(GatewayError::unsupported(format!("controller function {other}"))),
        }
    }

    fn schedule_output_broadcast(&self, frame: &Frame) -> Result<()> {
        if frame.data.len() < 2 {
            return Err(GatewayError::frame("GET_OUTPUT_VALUE payload too short"));
        }
        let mp = MappingPoint::from_bytes([frame.data[0], frame.data[1]]);
        let mut slots = self.inner.output_mapping.lock().unwrap();
        let idx = mp.channel_id as usize;
        if let Some(Some(slot)) = slots.get_mut(idx) {
            let now = Instant::now();
            slot.send_time = Some(now);
            slot.send_end_time = Some(now + OUTPUT_BROADCAST_WINDOW);
            slot.mapping_point = Some(mp);
        } else {
            return Err(GatewayError::driver(format!("output channel {idx} not configured")));
        }
        Ok(())
    }

    fn dispatch_remote_control_request(&self, frame: &Frame) -> Result<Option<Frame>> {
        match frame.header.function_id {
            remote_control_fn::GET_PARAMETER_VALUE => {
                let param = IndexedParameter::decode(&frame.data)?;
                if param.program_type != program_type::CONTROLLER {
                    return Err(GatewayError::unsupported(format!(
                        "GET_PARAMETER_VALUE for non-controller program_type {}",
                        param.program_type
                    )));
                }
                let key = param.raw_info();
                let response_key = [param.program_type, param.parameter_id, param.index];

                let value_bytes = match self.inner.parameter_mapping.get(&key) {
                    Some(entry) => {
                        if !self.inner.freshness.is_fresh(&entry.device_id, &entry.control_id, entry.value_timeout_min) {
                            SENSOR_UNDEFINED_WORD.to_le_bytes().to_vec()
                        } else {
                            match self.inner.broker.read_value(&entry.device_id, &entry.control_id) {
                                Ok(Some(value)) => ValueCodec::IntDivisor(self.inner.value_codec)
                                    .encode(&value)
                                    .unwrap_or_else(|_| SENSOR_UNDEFINED_WORD.to_le_bytes().to_vec()),
                                _ => SENSOR_UNDEFINED_WORD.to_le_bytes().to_vec(),
                            }
                        }
                    }
                    None => SENSOR_UNDEFINED_WORD.to_le_bytes().to_vec(),
                };

                let mut data = response_key.to_vec();
                data.extend_from_slice(&value_bytes);
                Ok(Some(Frame::response_to(frame, data)?))
            }
            other => Err(GatewayError::unsupported(format!("remote_control function {other}"))),
        }
    }

    fn service_scheduled_work(&self) {
        self.service_keep_alive();
        self.service_connection_timeout();
        self.service_output_broadcasts();
    }

    fn service_keep_alive(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let ControllerState::Idle { next_iam_here } = &mut *state {
            let now = Instant::now();
            if now >= *next_iam_here {
                let header = Header::new(program_type::CONTROLLER, self.inner.id, controller_fn::I_AM_HERE, MessageType::Response);
                if let Ok(frame) = Frame::new(header, vec![EXTENDED_CONTROLLER_HW_TYPE]) {
                    if let Err(e) = self.inner.bus.send(frame) {
                        warn!(controller_id = self.inner.id, "failed to send I_AM_HERE: {e}");
                    }
                }
                *next_iam_here = now + KEEP_ALIVE_INTERVAL;
            }
        }
    }

    fn service_connection_timeout(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let ControllerState::Running { reset_connection_time } = *state {
            if Instant::now() >= reset_connection_time {
                info!(controller_id = self.inner.id, "connection timed out, returning to IDLE");
                *state = ControllerState::Idle {
                    next_iam_here: Instant::now(),
                };
            }
        }
    }

    fn service_output_broadcasts(&self) {
        let now = Instant::now();
        let mut slots = self.inner.output_mapping.lock().unwrap();
        for slot in slots.iter_mut().flatten() {
            let (Some(send_time), Some(send_end_time), Some(mp)) = (slot.send_time, slot.send_end_time, slot.mapping_point) else {
                continue;
            };
            if send_end_time <= now || send_time > now {
                continue;
            }
            // Encoded with the same signed-16/10 codec `GET_PARAMETER_VALUE`
            // uses (§4.6), so a control holding a decimal string like
            // "23.4" scales correctly instead of failing an integer parse
            // and broadcasting zero. `encode` writes LSB-first; the wire
            // format here is big-endian (§9 OQ1), so the two bytes are
            // swapped when placed into the frame.
            let value_bytes = self
                .inner
                .broker
                .read_value(&slot.device_id, &slot.control_id)
                .ok()
                .flatten()
                .and_then(|v| ValueCodec::IntDivisor(self.inner.value_codec).encode(&v).ok())
                .unwrap_or_else(|| vec![0, 0]);
            let mp_bytes = mp.to_bytes();
            let data = vec![mp_bytes[0], mp_bytes[1], value_bytes[1], value_bytes[0]];
            let header = Header::new(program_type::CONTROLLER, self.inner.id, controller_fn::GET_OUTPUT_VALUE, MessageType::Response);
            if let Ok(frame) = Frame::new(header, data) {
                if let Err(e) = self.inner.bus.send(frame) {
                    warn!(controller_id = self.inner.id, "failed to send output broadcast: {e}");
                }
            }
            slot.send_time = Some(now + OUTPUT_BROADCAST_PERIOD);
        }
    }

    /// Stops the worker thread and joins it, with no timeout of its own —
    /// the orchestrator applies the overall stop timeout (§5 cancellation
    /// protocol). Takes `&self` since the worker thread itself holds a
    /// clone of this controller's `Arc` for the lifetime of its loop, so a
    /// `&mut self` that required unique ownership could never be obtained
    /// while the thread is still running.
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let (_, cvar) = &*self.queue;
        cvar.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl FrameHandler for MqttToSmartWebController {
    fn handle(&self, frame: &Frame) -> bool {
        if !self.is_frame_for_me(frame) {
            return false;
        }
        let (lock, cvar) = &*self.queue;
        lock.lock().unwrap().push_back(frame.clone());
        cvar.notify_all();
        true
    }
}

impl MqttToSmartWebController {
    fn is_frame_for_me(&self, frame: &Frame) -> bool {
        if frame.header.program_id == self.inner.id {
            return true;
        }
        if frame.header.program_type == program_type::CONTROLLER
            && frame.header.message_type == MessageType::Request
            && frame.header.function_id == controller_fn::GET_OUTPUT_VALUE
            && frame.data.len() >= 2
        {
            let mp = MappingPoint::from_bytes([frame.data[0], frame.data[1]]);
            return mp.host_id == self.inner.id;
        }
        false
    }
}
