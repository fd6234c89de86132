//! Applies validated commands to the configuration store and produces the state to echo.

use log::info;

use crate::calibration::{battery_percent, moisture_percent};
use crate::error::CommandError;
use crate::protocol::command::{validate_batt_v_max, validate_batt_v_min, Command};
use crate::protocol::topics::StateTopic;
use crate::record::ConfigurationRecord;
use crate::sensor::Sampler;
use crate::store::{BlobStore, ConfigStore};

/// A state value to publish on one of the device's state topics.
#[derive(Clone, Debug, PartialEq)]
pub struct StateUpdate {
    pub topic: StateTopic,
    pub payload: String,
}

impl StateUpdate {
    fn new(topic: StateTopic, payload: String) -> Self {
        Self { topic, payload }
    }

    pub fn retained(&self) -> bool {
        self.topic.retained()
    }
}

fn volts(v: f32) -> String {
    format!("{:.2}", v)
}

fn humidity(avg: u16, record: &ConfigurationRecord) -> StateUpdate {
    let percent = moisture_percent(avg, record.soil_wet_raw, record.soil_dry_raw);
    StateUpdate::new(StateTopic::Humidity, format!("{:.1}", percent))
}

/// Calibration and schedule state, published retained after every connect.
pub fn retained_state(record: &ConfigurationRecord) -> Vec<StateUpdate> {
    vec![
        StateUpdate::new(StateTopic::SleepInterval, record.sleep_interval.to_string()),
        StateUpdate::new(StateTopic::BattVMin, volts(record.batt_v_min)),
        StateUpdate::new(StateTopic::BattVMax, volts(record.batt_v_max)),
        StateUpdate::new(StateTopic::SoilWetRaw, record.soil_wet_raw.to_string()),
        StateUpdate::new(StateTopic::SoilDryRaw, record.soil_dry_raw.to_string()),
    ]
}

/// Readings of one measurement pass. A failed channel contributes nothing.
pub fn reading_updates(
    battery_volts: Option<f32>,
    moisture_raw: Option<u16>,
    record: &ConfigurationRecord,
) -> Vec<StateUpdate> {
    let mut updates = Vec::with_capacity(3);
    if let Some(avg) = moisture_raw {
        updates.push(humidity(avg, record));
    }
    if let Some(v) = battery_volts {
        updates.push(StateUpdate::new(StateTopic::Battery, volts(v)));
        updates.push(StateUpdate::new(
            StateTopic::BatteryPct,
            battery_percent(v, record.batt_v_min, record.batt_v_max).to_string(),
        ));
    }
    updates
}

/// Persists the effect of `command` and returns the state to echo.
///
/// Battery bounds are checked against the record as currently persisted, so two
/// commands in a row can never leave an inverted range behind. Nothing is written
/// when validation or acquisition fails.
pub fn apply<B, S>(
    command: Command,
    store: &mut ConfigStore<B>,
    sampler: &mut S,
) -> Result<Vec<StateUpdate>, CommandError>
where
    B: BlobStore,
    S: Sampler,
{
    let updates = match command {
        Command::SetSleepInterval(minutes) => {
            let record = store.modify(|r| r.sleep_interval = minutes)?;
            vec![StateUpdate::new(StateTopic::SleepInterval, record.sleep_interval.to_string())]
        }
        Command::SetBattVMin(v) => {
            let v = validate_batt_v_min(v, store.get().batt_v_max)?;
            let record = store.modify(|r| r.batt_v_min = v)?;
            vec![StateUpdate::new(StateTopic::BattVMin, volts(record.batt_v_min))]
        }
        Command::SetBattVMax(v) => {
            let v = validate_batt_v_max(v, store.get().batt_v_min)?;
            let record = store.modify(|r| r.batt_v_max = v)?;
            vec![StateUpdate::new(StateTopic::BattVMax, volts(record.batt_v_max))]
        }
        Command::SetSoilWetRaw(raw) => {
            let record = store.modify(|r| r.soil_wet_raw = raw)?;
            vec![StateUpdate::new(StateTopic::SoilWetRaw, record.soil_wet_raw.to_string())]
        }
        Command::SetSoilDryRaw(raw) => {
            let record = store.modify(|r| r.soil_dry_raw = raw)?;
            vec![StateUpdate::new(StateTopic::SoilDryRaw, record.soil_dry_raw.to_string())]
        }
        Command::MarkWet => {
            let raw = sampler.moisture_raw()?;
            let record = store.modify(|r| r.soil_wet_raw = raw)?;
            info!("Wet bound captured at raw {}", raw);
            vec![
                StateUpdate::new(StateTopic::SoilWetRaw, record.soil_wet_raw.to_string()),
                humidity(raw, &record),
            ]
        }
        Command::MarkDry => {
            let raw = sampler.moisture_raw()?;
            let record = store.modify(|r| r.soil_dry_raw = raw)?;
            info!("Dry bound captured at raw {}", raw);
            vec![
                StateUpdate::new(StateTopic::SoilDryRaw, record.soil_dry_raw.to_string()),
                humidity(raw, &record),
            ]
        }
    };
    info!("Applied {}", command.name());
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcquisitionError;
    use crate::store::MemoryBlobStore;

    struct FixedSampler(Result<u16, AcquisitionError>);

    impl Sampler for FixedSampler {
        fn battery_volts(&mut self) -> Result<f32, AcquisitionError> {
            Err(AcquisitionError::Unavailable)
        }

        fn moisture_raw(&mut self) -> Result<u16, AcquisitionError> {
            self.0
        }
    }

    fn loaded() -> ConfigStore<MemoryBlobStore> {
        let mut store = ConfigStore::new(MemoryBlobStore::new());
        store.load();
        store
    }

    #[test]
    fn sleep_interval_is_persisted_and_echoed() {
        let mut store = loaded();
        let updates = apply(Command::SetSleepInterval(45), &mut store, &mut FixedSampler(Ok(0))).unwrap();

        assert_eq!(store.get().sleep_interval, 45);
        assert_eq!(updates, vec![StateUpdate::new(StateTopic::SleepInterval, "45".into())]);
        assert!(updates[0].retained());
    }

    #[test]
    fn battery_max_is_echoed_with_two_decimals() {
        let mut store = loaded();
        let updates = apply(Command::SetBattVMax(4.3), &mut store, &mut FixedSampler(Ok(0))).unwrap();
        assert_eq!(updates[0].payload, "4.30");
        assert_eq!(store.get().batt_v_max, 4.3);
    }

    #[test]
    fn max_above_ceiling_leaves_store_untouched() {
        let mut store = loaded();
        let before = store.get();
        assert!(apply(Command::SetBattVMax(6.0), &mut store, &mut FixedSampler(Ok(0))).is_err());
        assert_eq!(store.get(), before);
    }

    #[test]
    fn min_is_checked_against_persisted_max() {
        let mut store = loaded();
        let mut sampler = FixedSampler(Ok(0));
        apply(Command::SetBattVMax(3.2), &mut store, &mut sampler).unwrap_err();

        // lower max first, then a min at the new max is refused
        apply(Command::SetBattVMin(2.6), &mut store, &mut sampler).unwrap();
        apply(Command::SetBattVMax(3.2), &mut store, &mut sampler).unwrap();
        let result = apply(Command::SetBattVMin(3.2), &mut store, &mut sampler);
        assert!(matches!(result, Err(CommandError::CrossesBound { .. })));
        assert_eq!(store.get().batt_v_min, 2.6);

        apply(Command::SetBattVMin(3.19), &mut store, &mut sampler).unwrap();
        assert_eq!(store.get().batt_v_min, 3.19);
    }

    #[test]
    fn mark_wet_captures_and_republishes_moisture() {
        let mut store = loaded();
        let updates = apply(Command::MarkWet, &mut store, &mut FixedSampler(Ok(1150))).unwrap();

        assert_eq!(store.get().soil_wet_raw, 1150);
        assert_eq!(
            updates,
            vec![
                StateUpdate::new(StateTopic::SoilWetRaw, "1150".into()),
                StateUpdate::new(StateTopic::Humidity, "100.0".into()),
            ]
        );
    }

    #[test]
    fn mark_dry_captures_and_republishes_moisture() {
        let mut store = loaded();
        let updates = apply(Command::MarkDry, &mut store, &mut FixedSampler(Ok(3350))).unwrap();

        assert_eq!(store.get().soil_dry_raw, 3350);
        assert_eq!(
            updates,
            vec![
                StateUpdate::new(StateTopic::SoilDryRaw, "3350".into()),
                StateUpdate::new(StateTopic::Humidity, "0.0".into()),
            ]
        );
        assert!(updates[0].retained());
        assert!(!updates[1].retained());
    }

    #[test]
    fn raw_bounds_are_persisted_and_echoed() {
        let mut store = loaded();
        let mut sampler = FixedSampler(Ok(0));

        let updates = apply(Command::SetSoilWetRaw(1100), &mut store, &mut sampler).unwrap();
        assert_eq!(updates, vec![StateUpdate::new(StateTopic::SoilWetRaw, "1100".into())]);
        assert!(updates[0].retained());

        let updates = apply(Command::SetSoilDryRaw(4095), &mut store, &mut sampler).unwrap();
        assert_eq!(updates, vec![StateUpdate::new(StateTopic::SoilDryRaw, "4095".into())]);

        let record = store.get();
        assert_eq!((record.soil_wet_raw, record.soil_dry_raw), (1100, 4095));
        assert_eq!(store.load(), record);
    }

    #[test]
    fn mark_dry_with_failed_acquisition_changes_nothing() {
        let mut store = loaded();
        let result = apply(Command::MarkDry, &mut store, &mut FixedSampler(Err(AcquisitionError::ReadFailed(-1))));
        assert_eq!(result, Err(CommandError::Acquisition(AcquisitionError::ReadFailed(-1))));
        assert_eq!(store.get().soil_dry_raw, 3200);
    }

    #[test]
    fn retained_state_covers_calibration() {
        let updates = retained_state(&ConfigurationRecord::default());
        let payloads: Vec<&str> = updates.iter().map(|u| u.payload.as_str()).collect();
        assert_eq!(payloads, ["5", "3.20", "4.20", "1200", "3200"]);
        assert!(updates.iter().all(|u| u.retained() && !u.payload.is_empty()));
    }

    #[test]
    fn failed_battery_channel_is_omitted() {
        let record = ConfigurationRecord::default();
        let updates = reading_updates(None, Some(2200), &record);
        assert_eq!(updates, vec![StateUpdate::new(StateTopic::Humidity, "50.0".into())]);

        let updates = reading_updates(Some(3.7), None, &record);
        let topics: Vec<StateTopic> = updates.iter().map(|u| u.topic).collect();
        assert_eq!(topics, [StateTopic::Battery, StateTopic::BatteryPct]);
        assert_eq!(updates[1].payload, "50");
    }
}
