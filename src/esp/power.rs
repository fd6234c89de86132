use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

use crate::error::AcquisitionError;
use crate::platform::PowerRail;

/// Soil probe excitation supply on GPIO4.
pub struct GpioRail {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl GpioRail {
    /// Takes the pin and drives it low so the probe starts unpowered.
    pub fn new(pin: AnyOutputPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::output(pin)?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl PowerRail for GpioRail {
    fn set_powered(&mut self, on: bool) -> Result<(), AcquisitionError> {
        let res = if on { self.pin.set_high() } else { self.pin.set_low() };
        res.map_err(|_| AcquisitionError::PowerRail)
    }
}
