//! Oneshot ADC1 channels. ADC2 is shared with the Wi-Fi radio and unusable while attached.

use std::rc::Rc;

use esp_idf_sys::*;
use log::{error, info};

use crate::constants::ADC_FULL_SCALE;
use crate::error::AcquisitionError;
use crate::platform::AdcChannel;

/// XIAO ESP32-C3: battery divider on GPIO2, soil probe on GPIO3.
pub const BATTERY_CHANNEL: adc_channel_t = adc_channel_t_ADC_CHANNEL_2;
pub const MOISTURE_CHANNEL: adc_channel_t = adc_channel_t_ADC_CHANNEL_3;

pub struct OneshotUnit {
    handle: adc_oneshot_unit_handle_t,
}

impl OneshotUnit {
    /// Creates the ADC1 unit, or `None` when the driver refuses; the channels then
    /// report every read as unavailable.
    pub fn adc1() -> Option<Rc<Self>> {
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            clk_src: soc_periph_adc_rtc_clk_src_t_ADC_RTC_CLK_SRC_DEFAULT,
            ..Default::default()
        };
        let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        let res = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
        if res != ESP_OK {
            error!("Failed to init ADC unit, error code: {}", res);
            return None;
        }
        Some(Rc::new(Self { handle }))
    }
}

impl Drop for OneshotUnit {
    fn drop(&mut self) {
        unsafe {
            adc_oneshot_del_unit(self.handle);
        }
    }
}

pub struct OneshotChannel {
    unit: Option<Rc<OneshotUnit>>,
    channel: adc_channel_t,
}

impl OneshotChannel {
    pub fn new(unit: Option<Rc<OneshotUnit>>, channel: adc_channel_t) -> Self {
        let unit = unit.filter(|unit| {
            let chan_cfg = adc_oneshot_chan_cfg_t {
                atten: adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: adc_bitwidth_t_ADC_BITWIDTH_DEFAULT,
            };
            let res = unsafe { adc_oneshot_config_channel(unit.handle, channel, &chan_cfg) };
            if res != ESP_OK {
                error!("Failed to config ADC channel {}, error code: {}", channel, res);
                return false;
            }
            info!("ADC channel {} ready", channel);
            true
        });
        Self { unit, channel }
    }
}

impl AdcChannel for OneshotChannel {
    fn read_raw(&mut self) -> Result<u16, AcquisitionError> {
        let unit = self.unit.as_ref().ok_or(AcquisitionError::Unavailable)?;
        let mut value: i32 = 0;
        let res = unsafe { adc_oneshot_read(unit.handle, self.channel, &mut value) };
        if res != ESP_OK {
            return Err(AcquisitionError::ReadFailed(res));
        }
        match u16::try_from(value) {
            Ok(raw) if raw <= ADC_FULL_SCALE => Ok(raw),
            _ => Err(AcquisitionError::OutOfRange(value)),
        }
    }
}
