//! Parse-and-classify for inbound commands, plus the range checks they must pass.
//!
//! Everything here is pure; the checks that depend on stored state take the
//! currently persisted value as an argument.

use crate::constants::{ADC_FULL_SCALE, BATT_V_LIMIT_HIGH, BATT_V_LIMIT_LOW, SLEEP_MINUTES_MAX};
use crate::error::CommandError;
use crate::protocol::topics::CommandTopic;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    SetSleepInterval(u16),
    SetBattVMin(f32),
    SetBattVMax(f32),
    SetSoilWetRaw(u16),
    SetSoilDryRaw(u16),
    MarkWet,
    MarkDry,
}

impl Command {
    /// Turns a payload received on `topic` into a command. Static ranges are checked
    /// here; the battery bounds are checked against the stored pair when applied.
    pub fn parse(topic: CommandTopic, payload: &[u8]) -> Result<Self, CommandError> {
        let text = match topic {
            CommandTopic::MarkWet => return Ok(Command::MarkWet),
            CommandTopic::MarkDry => return Ok(Command::MarkDry),
            _ => core::str::from_utf8(payload)
                .map_err(|_| CommandError::NotUtf8)?
                .trim(),
        };
        let name = command_name(topic);

        match topic {
            CommandTopic::SleepInterval => {
                validate_sleep_interval(parse_int(name, text)?).map(Command::SetSleepInterval)
            }
            CommandTopic::SoilWetRaw => {
                validate_soil_raw(name, parse_int(name, text)?).map(Command::SetSoilWetRaw)
            }
            CommandTopic::SoilDryRaw => {
                validate_soil_raw(name, parse_int(name, text)?).map(Command::SetSoilDryRaw)
            }
            CommandTopic::BattVMin => parse_volts(name, text).map(Command::SetBattVMin),
            CommandTopic::BattVMax => parse_volts(name, text).map(Command::SetBattVMax),
            CommandTopic::MarkWet => Ok(Command::MarkWet),
            CommandTopic::MarkDry => Ok(Command::MarkDry),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::SetSleepInterval(_) => "sleep_interval",
            Command::SetBattVMin(_) => "batt_v_min",
            Command::SetBattVMax(_) => "batt_v_max",
            Command::SetSoilWetRaw(_) => "soil_wet_raw",
            Command::SetSoilDryRaw(_) => "soil_dry_raw",
            Command::MarkWet => "soil_mark_wet",
            Command::MarkDry => "soil_mark_dry",
        }
    }
}

fn command_name(topic: CommandTopic) -> &'static str {
    match topic {
        CommandTopic::SleepInterval => "sleep_interval",
        CommandTopic::BattVMin => "batt_v_min",
        CommandTopic::BattVMax => "batt_v_max",
        CommandTopic::SoilWetRaw => "soil_wet_raw",
        CommandTopic::SoilDryRaw => "soil_dry_raw",
        CommandTopic::MarkWet => "soil_mark_wet",
        CommandTopic::MarkDry => "soil_mark_dry",
    }
}

fn parse_int(command: &'static str, text: &str) -> Result<i64, CommandError> {
    text.parse::<i64>().map_err(|_| CommandError::Unparsable {
        command,
        payload: text.to_string(),
    })
}

fn parse_volts(command: &'static str, text: &str) -> Result<f32, CommandError> {
    match text.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CommandError::Unparsable {
            command,
            payload: text.to_string(),
        }),
    }
}

pub fn validate_sleep_interval(minutes: i64) -> Result<u16, CommandError> {
    if (0..=i64::from(SLEEP_MINUTES_MAX)).contains(&minutes) {
        Ok(minutes as u16)
    } else {
        Err(CommandError::OutOfRange {
            command: "sleep_interval",
            value: minutes.to_string(),
        })
    }
}

pub fn validate_soil_raw(command: &'static str, raw: i64) -> Result<u16, CommandError> {
    if (0..=i64::from(ADC_FULL_SCALE)).contains(&raw) {
        Ok(raw as u16)
    } else {
        Err(CommandError::OutOfRange {
            command,
            value: raw.to_string(),
        })
    }
}

/// Accepts `2.50 <= v < current_max`.
pub fn validate_batt_v_min(v: f32, current_max: f32) -> Result<f32, CommandError> {
    if !(v >= BATT_V_LIMIT_LOW) {
        return Err(CommandError::OutOfRange {
            command: "batt_v_min",
            value: format!("{:.2}", v),
        });
    }
    if v >= current_max {
        return Err(CommandError::CrossesBound {
            command: "batt_v_min",
            value: v,
            other: current_max,
        });
    }
    Ok(v)
}

/// Accepts `current_min < v <= 5.50`.
pub fn validate_batt_v_max(v: f32, current_min: f32) -> Result<f32, CommandError> {
    if !(v <= BATT_V_LIMIT_HIGH) {
        return Err(CommandError::OutOfRange {
            command: "batt_v_max",
            value: format!("{:.2}", v),
        });
    }
    if v <= current_min {
        return Err(CommandError::CrossesBound {
            command: "batt_v_max",
            value: v,
            other: current_min,
        });
    }
    Ok(v)
}
