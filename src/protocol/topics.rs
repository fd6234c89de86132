//! Topic naming: `soilsensor/<device-id>/...`.

use crate::constants::TOPIC_ROOT;
use crate::identity::DeviceIdentity;

/// Outbound state channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateTopic {
    Humidity,
    Battery,
    BatteryPct,
    SleepInterval,
    BattVMin,
    BattVMax,
    SoilWetRaw,
    SoilDryRaw,
}

impl StateTopic {
    pub fn suffix(self) -> &'static str {
        match self {
            StateTopic::Humidity => "humidity",
            StateTopic::Battery => "battery",
            StateTopic::BatteryPct => "battery_pct",
            StateTopic::SleepInterval => "sleep_interval",
            StateTopic::BattVMin => "batt_v_min",
            StateTopic::BattVMax => "batt_v_max",
            StateTopic::SoilWetRaw => "soil_wet_raw",
            StateTopic::SoilDryRaw => "soil_dry_raw",
        }
    }

    pub fn retained(self) -> bool {
        !matches!(self, StateTopic::Humidity | StateTopic::Battery | StateTopic::BatteryPct)
    }
}

/// Inbound command channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTopic {
    SleepInterval,
    BattVMin,
    BattVMax,
    SoilWetRaw,
    SoilDryRaw,
    MarkWet,
    MarkDry,
}

impl CommandTopic {
    pub const ALL: [CommandTopic; 7] = [
        CommandTopic::SleepInterval,
        CommandTopic::BattVMin,
        CommandTopic::BattVMax,
        CommandTopic::SoilWetRaw,
        CommandTopic::SoilDryRaw,
        CommandTopic::MarkWet,
        CommandTopic::MarkDry,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            CommandTopic::SleepInterval => "sleep_interval/set",
            CommandTopic::BattVMin => "set/batt_v_min",
            CommandTopic::BattVMax => "set/batt_v_max",
            CommandTopic::SoilWetRaw => "set/soil_wet_raw",
            CommandTopic::SoilDryRaw => "set/soil_dry_raw",
            CommandTopic::MarkWet => "cmd/soil_mark_wet",
            CommandTopic::MarkDry => "cmd/soil_mark_dry",
        }
    }
}

/// Topic builder bound to one device.
#[derive(Clone, Debug)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            base: format!("{}/{}", TOPIC_ROOT, identity),
        }
    }

    pub fn state(&self, topic: StateTopic) -> String {
        format!("{}/{}", self.base, topic.suffix())
    }

    pub fn command(&self, topic: CommandTopic) -> String {
        format!("{}/{}", self.base, topic.suffix())
    }

    /// Maps an inbound topic string onto a command channel of this device.
    pub fn classify(&self, topic: &str) -> Option<CommandTopic> {
        let rest = topic.strip_prefix(self.base.as_str())?.strip_prefix('/')?;
        CommandTopic::ALL.into_iter().find(|c| c.suffix() == rest)
    }
}
