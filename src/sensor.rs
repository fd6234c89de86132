//! Acquisition of battery and moisture samples.
//!
//! The moisture probe sits on a switched excitation supply. [`RailGuard`] powers it for
//! the duration of one averaging window and switches it off again on every exit path.

use log::{error, info, warn};

use crate::calibration::{average_round_half_up, battery_volts_from_raw};
use crate::constants::*;
use crate::error::AcquisitionError;
use crate::platform::{AdcChannel, Delay, PowerRail};

/// What the duty cycle and the calibration commands need from the sensors.
pub trait Sampler {
    /// Battery voltage from a single instantaneous sample.
    fn battery_volts(&mut self) -> Result<f32, AcquisitionError>;

    /// Averaged raw moisture sample in 0..=4095.
    fn moisture_raw(&mut self) -> Result<u16, AcquisitionError>;
}

pub struct Sensors<M, B, R, D> {
    moisture: M,
    battery: B,
    rail: R,
    delay: D,
}

impl<M, B, R, D> Sensors<M, B, R, D>
where
    M: AdcChannel,
    B: AdcChannel,
    R: PowerRail,
    D: Delay,
{
    pub fn new(moisture: M, battery: B, rail: R, delay: D) -> Self {
        Self {
            moisture,
            battery,
            rail,
            delay,
        }
    }
}

impl<M, B, R, D> Sampler for Sensors<M, B, R, D>
where
    M: AdcChannel,
    B: AdcChannel,
    R: PowerRail,
    D: Delay,
{
    fn battery_volts(&mut self) -> Result<f32, AcquisitionError> {
        let raw = checked(self.battery.read_raw())?;
        let volts = battery_volts_from_raw(raw);
        info!("Battery raw: {} -> {:.2} V", raw, volts);
        Ok(volts)
    }

    fn moisture_raw(&mut self) -> Result<u16, AcquisitionError> {
        let _powered = RailGuard::power_on(&mut self.rail)?;
        self.delay.delay_ms(SOIL_POWER_SETTLE_MS);

        let mut sum: u32 = 0;
        for i in 0..SOIL_SAMPLE_COUNT {
            if i > 0 {
                self.delay.delay_ms(SOIL_SAMPLE_SPACING_MS);
            }
            match checked(self.moisture.read_raw()) {
                Ok(raw) => sum += u32::from(raw),
                Err(e) => {
                    warn!("Soil sample {} failed: {}, discarding window", i, e);
                    return Err(e);
                }
            }
        }

        let avg = average_round_half_up(sum, SOIL_SAMPLE_COUNT);
        info!("Soil raw avg over {} samples: {}", SOIL_SAMPLE_COUNT, avg);
        Ok(avg)
    }
}

fn checked(sample: Result<u16, AcquisitionError>) -> Result<u16, AcquisitionError> {
    match sample {
        Ok(raw) if raw > ADC_FULL_SCALE => Err(AcquisitionError::OutOfRange(i32::from(raw))),
        other => other,
    }
}

/// Keeps the excitation supply asserted while alive.
pub struct RailGuard<'a, R: PowerRail> {
    rail: &'a mut R,
}

impl<'a, R: PowerRail> RailGuard<'a, R> {
    pub fn power_on(rail: &'a mut R) -> Result<Self, AcquisitionError> {
        if let Err(e) = rail.set_powered(true) {
            // A half-switched rail still gets pulled low.
            let _ = rail.set_powered(false);
            return Err(e);
        }
        Ok(Self { rail })
    }
}

impl<R: PowerRail> Drop for RailGuard<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.rail.set_powered(false) {
            error!("Failed to power down soil probe: {}", e);
        }
    }
}
