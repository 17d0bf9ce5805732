//! Reference `BrokerClient` implementation against an MQTT broker, using
//! Wirenboard-style `/devices/<id>/controls/<id>` topic conventions. The
//! broker client itself is an out-of-scope external collaborator (§1); this
//! is the concrete adapter needed to produce a runnable binary, the way
//! `comsrv` ships concrete `Transport` impls behind its `Transport` trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use rumqttc::{Client, Event, Incoming, MqttOptions, Packet, QoS};
use tracing::{debug, error, warn};

use crate::broker::types::{ControlMeta, ValueChangeEvent};
use crate::error::{GatewayError, Result};

pub trait BrokerClient: Send + Sync {
    fn ensure_device(&self, device_id: &str, name: &str) -> Result<()>;
    fn ensure_control(&self, device_id: &str, control_id: &str, meta: &ControlMeta) -> Result<()>;
    fn publish_value(&self, device_id: &str, control_id: &str, value: &str) -> Result<()>;
    fn read_value(&self, device_id: &str, control_id: &str) -> Result<Option<String>>;
    fn set_error(&self, device_id: &str, control_id: &str, error: &str) -> Result<()>;
    fn clear_error(&self, device_id: &str, control_id: &str) -> Result<()>;
    fn remove_device(&self, device_id: &str) -> Result<()>;
    /// Registers a callback invoked on the broker-events thread whenever a
    /// writable control's `/on` topic receives a new value.
    fn on_value_change(&self, callback: Box<dyn Fn(ValueChangeEvent) + Send + Sync>);
}

struct Cache {
    values: HashMap<(String, String), String>,
}

pub struct MqttBrokerClient {
    client: Mutex<Client>,
    cache: Arc<Mutex<Cache>>,
    topic_prefix: String,
    callbacks: Arc<Mutex<Vec<Box<dyn Fn(ValueChangeEvent) + Send + Sync>>>>,
    known_devices: DashMap<String, ()>,
}

impl MqttBrokerClient {
    /// Connects and spawns the dedicated broker-events thread (§5) that
    /// drains the connection and dispatches `/on` writes to registered
    /// callbacks.
    pub fn connect(host: &str, port: u16, client_id: &str, username: Option<&str>, password: Option<&str>, topic_prefix: &str) -> Result<Self> {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(user), Some(pass)) = (username, password) {
            options.set_credentials(user, pass);
        }

        let (client, mut connection) = Client::new(options, 256);
        client
            .subscribe(format!("{topic_prefix}/devices/+/controls/+/on"), QoS::AtLeastOnce)
            .map_err(|e| GatewayError::BrokerIo(format!("subscribing to control writes: {e}")))?;

        let cache = Arc::new(Mutex::new(Cache { values: HashMap::new() }));
        let callbacks: Arc<Mutex<Vec<Box<dyn Fn(ValueChangeEvent) + Send + Sync>>>> = Arc::new(Mutex::new(Vec::new()));

        let thread_cache = Arc::clone(&cache);
        let thread_callbacks = Arc::clone(&callbacks);
        std::thread::spawn(move || {
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        if let Some((device_id, control_id)) = parse_on_topic(&publish.topic) {
                            let value = String::from_utf8_lossy(&publish.payload).to_string();
                            thread_cache
                                .lock()
                                .unwrap()
                                .values
                                .insert((device_id.clone(), control_id.clone()), value.clone());
                            for cb in thread_callbacks.lock().unwrap().iter() {
                                cb(ValueChangeEvent {
                                    device_id: device_id.clone(),
                                    control_id: control_id.clone(),
                                    value: value.clone(),
                                });
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("broker connection error: {e}");
                    }
                }
            }
        });

        Ok(MqttBrokerClient {
            client: Mutex::new(client),
            cache,
            topic_prefix: topic_prefix.to_string(),
            callbacks,
            known_devices: DashMap::new(),
        })
    }

    fn publish(&self, topic: String, payload: String, retain: bool) -> Result<()> {
        self.client
            .lock()
            .unwrap()
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|e| GatewayError::BrokerIo(e.to_string()))
    }
}

fn parse_on_topic(topic: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = topic.split('/').collect();
    let idx = parts.iter().position(|p| *p == "devices")?;
    let device_id = parts.get(idx + 1)?.to_string();
    let control_id = parts.get(idx + 3)?.to_string();
    Some((device_id, control_id))
}

impl BrokerClient for MqttBrokerClient {
    fn ensure_device(&self, device_id: &str, name: &str) -> Result<()> {
        if self.known_devices.contains_key(device_id) {
            return Ok(());
        }
        self.publish(format!("{}/devices/{device_id}/meta/name", self.topic_prefix), name.to_string(), true)?;
        self.known_devices.insert(device_id.to_string(), ());
        Ok(())
    }

    fn ensure_control(&self, device_id: &str, control_id: &str, meta: &ControlMeta) -> Result<()> {
        let base = format!("{}/devices/{device_id}/controls/{control_id}/meta", self.topic_prefix);
        self.publish(format!("{base}/type"), meta.display_type.clone(), true)?;
        self.publish(
            format!("{base}/readonly"),
            if meta.read_only { "1" } else { "0" }.to_string(),
            true,
        )?;
        if let Some(max) = meta.max {
            self.publish(format!("{base}/max"), max.to_string(), true)?;
        }
        if let Some(units) = &meta.units {
            self.publish(format!("{base}/units"), units.clone(), true)?;
        }
        Ok(())
    }

    fn publish_value(&self, device_id: &str, control_id: &str, value: &str) -> Result<()> {
        self.cache
            .lock()
            .unwrap()
            .values
            .insert((device_id.to_string(), control_id.to_string()), value.to_string());
        self.publish(
            format!("{}/devices/{device_id}/controls/{control_id}", self.topic_prefix),
            value.to_string(),
            true,
        )
    }

    fn read_value(&self, device_id: &str, control_id: &str) -> Result<Option<String>> {
        Ok(self
            .cache
            .lock()
            .unwrap()
            .values
            .get(&(device_id.to_string(), control_id.to_string()))
            .cloned())
    }

    fn set_error(&self, device_id: &str, control_id: &str, error: &str) -> Result<()> {
        debug!(device_id, control_id, error, "setting control error");
        self.publish(
            format!("{}/devices/{device_id}/controls/{control_id}/meta/error", self.topic_prefix),
            error.to_string(),
            true,
        )
    }

    fn clear_error(&self, device_id: &str, control_id: &str) -> Result<()> {
        self.set_error(device_id, control_id, "")
    }

    fn remove_device(&self, device_id: &str) -> Result<()> {
        self.known_devices.remove(device_id);
        self.publish(format!("{}/devices/{device_id}/meta/name", self.topic_prefix), String::new(), true)
            .map_err(|e| {
                error!("failed to clear device {device_id} on removal: {e}");
                e
            })
    }

    fn on_value_change(&self, callback: Box<dyn Fn(ValueChangeEvent) + Send + Sync>) {
        self.callbacks.lock().unwrap().push(callback);
    }
}
