//! ESP-MQTT client. Transport callbacks only translate events and forward them over a
//! channel; all handling happens on the duty-cycle task.

use core::ffi::c_void;
use std::ffi::CString;
use std::sync::mpsc::Sender;

use anyhow::{anyhow, Result};
use esp_idf_sys::*;
use log::{debug, error, info, warn};

use crate::identity::DeviceIdentity;
use crate::platform::{ChannelEvent, ControlChannel, ControlConnector, Qos};
use crate::record::ConfigurationRecord;

const KEEPALIVE_SECS: i32 = 30;
const BUFFER_SIZE: i32 = 2048;

pub struct MqttConnector {
    events: Sender<ChannelEvent>,
}

impl MqttConnector {
    pub fn new(events: Sender<ChannelEvent>) -> Self {
        Self { events }
    }
}

impl ControlConnector for MqttConnector {
    type Channel = MqttChannel;

    fn start(&mut self, record: &ConfigurationRecord, identity: &DeviceIdentity) -> Result<MqttChannel> {
        let host = record.broker_host().map_err(|e| anyhow!("{}", e))?;
        MqttChannel::start(host, record, identity, self.events.clone())
    }
}

pub struct MqttChannel {
    client: *mut esp_mqtt_client,
    events: *mut Sender<ChannelEvent>,
}

impl MqttChannel {
    fn start(
        host: &str,
        record: &ConfigurationRecord,
        identity: &DeviceIdentity,
        events: Sender<ChannelEvent>,
    ) -> Result<Self> {
        let host_cstr = CString::new(host)?;
        let username_cstr = CString::new(record.mqtt_user.as_str())?;
        let password_cstr = CString::new(record.mqtt_pass.as_str())?;
        let client_id_cstr = CString::new(identity.client_id().as_str())?;
        let has_credentials = !record.mqtt_user.is_empty();

        unsafe {
            let config = esp_mqtt_client_config_t {
                broker: esp_mqtt_client_config_t_broker_t {
                    address: esp_mqtt_client_config_t_broker_t_address_t {
                        hostname: host_cstr.as_ptr(),
                        port: u32::from(record.mqtt_port),
                        transport: esp_mqtt_transport_t_MQTT_TRANSPORT_OVER_TCP,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                credentials: esp_mqtt_client_config_t_credentials_t {
                    username: if has_credentials { username_cstr.as_ptr() } else { core::ptr::null() },
                    client_id: client_id_cstr.as_ptr(),
                    authentication: esp_mqtt_client_config_t_credentials_t_authentication_t {
                        password: if has_credentials { password_cstr.as_ptr() } else { core::ptr::null() },
                        ..Default::default()
                    },
                    ..Default::default()
                },
                session: esp_mqtt_client_config_t_session_t {
                    keepalive: KEEPALIVE_SECS,
                    ..Default::default()
                },
                buffer: esp_mqtt_client_config_t_buffer_t {
                    size: BUFFER_SIZE,
                    out_size: BUFFER_SIZE,
                    ..Default::default()
                },
                ..Default::default()
            };
            let client = esp_mqtt_client_init(&config);
            if client.is_null() {
                return Err(anyhow!("Failed to initialize MQTT client"));
            }

            let events = Box::into_raw(Box::new(events));
            esp_mqtt_client_register_event(
                client,
                esp_mqtt_event_id_t_MQTT_EVENT_ANY,
                Some(Self::mqtt_event_handler),
                events as *mut c_void,
            );
            let err = esp_mqtt_client_start(client);
            if err != ESP_OK {
                esp_mqtt_client_destroy(client);
                drop(Box::from_raw(events));
                return Err(anyhow!("Failed to start MQTT client, error code: {}", err));
            }
            info!("MQTT client started for {}:{}", host, record.mqtt_port);
            Ok(Self { client, events })
        }
    }

    extern "C" fn mqtt_event_handler(
        handler_args: *mut c_void,
        _base: esp_event_base_t,
        event_id: i32,
        event_data: *mut c_void,
    ) {
        unsafe {
            let events = handler_args as *const Sender<ChannelEvent>;
            if events.is_null() || event_data.is_null() {
                error!("MQTT event without context");
                return;
            }
            let event = &*(event_data as *mut esp_mqtt_event_t);
            let forwarded = match event_id {
                id if id == esp_mqtt_event_id_t_MQTT_EVENT_CONNECTED as i32 => Some(ChannelEvent::Connected),
                id if id == esp_mqtt_event_id_t_MQTT_EVENT_DISCONNECTED as i32 => Some(ChannelEvent::Disconnected),
                id if id == esp_mqtt_event_id_t_MQTT_EVENT_DATA as i32 => {
                    let topic_len = event.topic_len.max(0) as usize;
                    let data_len = event.data_len.max(0) as usize;
                    if event.current_data_offset != 0 || data_len != event.total_data_len.max(0) as usize {
                        warn!("Dropping fragmented MQTT message ({} bytes)", event.total_data_len);
                        None
                    } else if topic_len == 0 {
                        None
                    } else {
                        let topic_slice = core::slice::from_raw_parts(event.topic as *const u8, topic_len);
                        let payload = if data_len > 0 {
                            core::slice::from_raw_parts(event.data as *const u8, data_len).to_vec()
                        } else {
                            Vec::new()
                        };
                        match core::str::from_utf8(topic_slice) {
                            Ok(topic) => Some(ChannelEvent::Message {
                                topic: topic.to_string(),
                                payload,
                            }),
                            Err(_) => {
                                warn!("Dropping MQTT message with non UTF-8 topic");
                                None
                            }
                        }
                    }
                }
                id if id == esp_mqtt_event_id_t_MQTT_EVENT_ERROR as i32 => {
                    error!("MQTT error event");
                    None
                }
                _ => {
                    debug!("Unhandled MQTT event, event_id: {}", event_id);
                    None
                }
            };
            if let Some(forwarded) = forwarded {
                if (*events).send(forwarded).is_err() {
                    warn!("Duty cycle no longer listening for MQTT events");
                }
            }
        }
    }
}

impl ControlChannel for MqttChannel {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retain: bool) -> Result<()> {
        let topic_cstr = CString::new(topic)?;
        let qos = match qos {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
        };
        let msg_id = unsafe {
            esp_mqtt_client_publish(
                self.client,
                topic_cstr.as_ptr(),
                payload.as_ptr().cast(),
                payload.len() as i32,
                qos,
                retain as i32,
            )
        };
        if msg_id < 0 {
            Err(anyhow!("Failed to publish message to {}: {}", topic, msg_id))
        } else {
            debug!("Published message to {} with ID: {}", topic, msg_id);
            Ok(())
        }
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        let topic_cstr = CString::new(topic)?;
        let result = unsafe { esp_mqtt_client_subscribe_single(self.client, topic_cstr.as_ptr(), 1) };
        if result < 0 {
            Err(anyhow!("Failed to subscribe to topic: {}", topic))
        } else {
            info!("Subscribed to topic: {}", topic);
            Ok(())
        }
    }
}

impl Drop for MqttChannel {
    fn drop(&mut self) {
        unsafe {
            esp_mqtt_client_stop(self.client);
            esp_mqtt_client_destroy(self.client);
            // the handler can no longer run once the client is destroyed
            drop(Box::from_raw(self.events));
        }
    }
}
