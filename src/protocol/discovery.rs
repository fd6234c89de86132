//! Home Assistant MQTT discovery.
//!
//! One retained config payload per entity lets Home Assistant register the node without
//! manual setup. Reference: https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery

use serde::Serialize;

use crate::constants::*;
use crate::identity::DeviceIdentity;
use crate::protocol::topics::{CommandTopic, StateTopic, Topics};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Component {
    Sensor,
    Number,
    Button,
}

impl Component {
    fn as_str(self) -> &'static str {
        match self {
            Component::Sensor => "sensor",
            Component::Number => "number",
            Component::Button => "button",
        }
    }
}

/// Static description of one exposed entity.
struct Entity {
    component: Component,
    object: &'static str,
    name: &'static str,
    state: Option<StateTopic>,
    command: Option<CommandTopic>,
    unit: Option<&'static str>,
    device_class: Option<&'static str>,
    range: Option<(f32, f32, f32)>,
    config: bool,
}

const ENTITIES: [Entity; 10] = [
    Entity {
        component: Component::Sensor,
        object: "humidity",
        name: "Soil Moisture",
        state: Some(StateTopic::Humidity),
        command: None,
        unit: Some("%"),
        device_class: Some("moisture"),
        range: None,
        config: false,
    },
    Entity {
        component: Component::Sensor,
        object: "battery",
        name: "Battery Voltage",
        state: Some(StateTopic::Battery),
        command: None,
        unit: Some("V"),
        device_class: Some("voltage"),
        range: None,
        config: false,
    },
    Entity {
        component: Component::Sensor,
        object: "battery_pct",
        name: "Battery",
        state: Some(StateTopic::BatteryPct),
        command: None,
        unit: Some("%"),
        device_class: Some("battery"),
        range: None,
        config: false,
    },
    Entity {
        component: Component::Number,
        object: "sleep_interval",
        name: "Sleep Interval",
        state: Some(StateTopic::SleepInterval),
        command: Some(CommandTopic::SleepInterval),
        unit: Some("min"),
        device_class: None,
        range: Some((0.0, SLEEP_MINUTES_MAX as f32, 1.0)),
        config: true,
    },
    Entity {
        component: Component::Number,
        object: "batt_v_min",
        name: "Battery Empty Voltage",
        state: Some(StateTopic::BattVMin),
        command: Some(CommandTopic::BattVMin),
        unit: Some("V"),
        device_class: Some("voltage"),
        range: Some((BATT_V_LIMIT_LOW, BATT_V_LIMIT_HIGH, 0.01)),
        config: true,
    },
    Entity {
        component: Component::Number,
        object: "batt_v_max",
        name: "Battery Full Voltage",
        state: Some(StateTopic::BattVMax),
        command: Some(CommandTopic::BattVMax),
        unit: Some("V"),
        device_class: Some("voltage"),
        range: Some((BATT_V_LIMIT_LOW, BATT_V_LIMIT_HIGH, 0.01)),
        config: true,
    },
    Entity {
        component: Component::Number,
        object: "soil_wet_raw",
        name: "Soil Wet Raw",
        state: Some(StateTopic::SoilWetRaw),
        command: Some(CommandTopic::SoilWetRaw),
        unit: None,
        device_class: None,
        range: Some((0.0, ADC_FULL_SCALE as f32, 1.0)),
        config: true,
    },
    Entity {
        component: Component::Number,
        object: "soil_dry_raw",
        name: "Soil Dry Raw",
        state: Some(StateTopic::SoilDryRaw),
        command: Some(CommandTopic::SoilDryRaw),
        unit: None,
        device_class: None,
        range: Some((0.0, ADC_FULL_SCALE as f32, 1.0)),
        config: true,
    },
    Entity {
        component: Component::Button,
        object: "soil_mark_wet",
        name: "Mark Soil Wet",
        state: None,
        command: Some(CommandTopic::MarkWet),
        unit: None,
        device_class: None,
        range: None,
        config: true,
    },
    Entity {
        component: Component::Button,
        object: "soil_mark_dry",
        name: "Mark Soil Dry",
        state: None,
        command: Some(CommandTopic::MarkDry),
        unit: None,
        device_class: None,
        range: None,
        config: true,
    },
];

#[derive(Serialize)]
struct Device<'a> {
    identifiers: [String; 1],
    name: String,
    model: &'a str,
    manufacturer: &'a str,
    sw_version: &'a str,
}

#[derive(Serialize)]
struct Payload<'a> {
    name: &'a str,
    unique_id: String,
    object_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_press: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_category: Option<&'a str>,
    device: Device<'a>,
}

/// A discovery config ready to publish retained.
#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    pub topic: String,
    pub payload: String,
}

/// Builds the announcement for every exposed entity.
pub fn announcements(topics: &Topics, identity: &DeviceIdentity) -> Vec<Announcement> {
    ENTITIES
        .iter()
        .filter_map(|entity| {
            let payload = payload(entity, topics, identity);
            match serde_json::to_string(&payload) {
                Ok(payload) => Some(Announcement {
                    topic: format!(
                        "{}/{}/{}/{}/config",
                        DISCOVERY_PREFIX,
                        entity.component.as_str(),
                        identity,
                        entity.object
                    ),
                    payload,
                }),
                Err(e) => {
                    log::error!("Failed to encode discovery for {}: {}", entity.object, e);
                    None
                }
            }
        })
        .collect()
}

fn payload<'a>(entity: &'a Entity, topics: &Topics, identity: &DeviceIdentity) -> Payload<'a> {
    let is_number = entity.component == Component::Number;
    Payload {
        name: entity.name,
        unique_id: format!("{}_{}_{}", TOPIC_ROOT, identity, entity.object),
        object_id: format!("{}_{}_{}", TOPIC_ROOT, identity, entity.object),
        state_topic: entity.state.map(|t| topics.state(t)),
        command_topic: entity.command.map(|t| topics.command(t)),
        unit_of_measurement: entity.unit,
        device_class: entity.device_class,
        state_class: (entity.component == Component::Sensor).then_some("measurement"),
        min: entity.range.map(|(min, _, _)| min),
        max: entity.range.map(|(_, max, _)| max),
        step: entity.range.map(|(_, _, step)| step),
        mode: is_number.then_some("box"),
        payload_press: (entity.component == Component::Button).then_some("1"),
        entity_category: entity.config.then_some("config"),
        device: Device {
            identifiers: [identity.client_id().as_str().to_string()],
            name: format!("{} {}", DEVICE_NAME, identity),
            model: DEVICE_MODEL,
            manufacturer: DEVICE_MANUFACTURER,
            sw_version: FIRMWARE_VERSION,
        },
    }
}
