//! ESP-IDF implementations of the platform seams.

pub mod adc;
pub mod mqtt;
pub mod nvs;
pub mod portal;
pub mod power;
pub mod wifi;

use core::time::Duration;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_sys::*;

use crate::platform::{Clock, Delay, Suspender};

#[inline(always)]
pub fn ms_to_ticks(ms: u32) -> u32 {
    (ms as u64 * configTICK_RATE_HZ as u64 / 1000) as u32
}

impl Delay for FreeRtos {
    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

/// Uptime from the high resolution timer, waits on the FreeRTOS tick.
pub struct EspClock;

impl Clock for EspClock {
    fn uptime(&self) -> Duration {
        let us = unsafe { esp_timer_get_time() };
        Duration::from_micros(us.max(0) as u64)
    }

    fn sleep(&mut self, duration: Duration) {
        let ms = duration.as_millis().min(u128::from(u32::MAX)) as u32;
        unsafe { vTaskDelay(ms_to_ticks(ms).max(1)) };
    }
}

/// Timer-woken deep sleep. The wake is a full reset.
pub struct DeepSleep;

impl Suspender for DeepSleep {
    fn suspend(&mut self, duration: Duration) {
        let us = duration.as_micros().min(u128::from(u64::MAX)) as u64;
        unsafe {
            esp_sleep_enable_timer_wakeup(us);
            esp_deep_sleep_start();
        }
    }
}

/// Station MAC from eFuse, the source of the device identity.
pub fn read_station_mac() -> anyhow::Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let err = unsafe { esp_read_mac(mac.as_mut_ptr(), esp_mac_type_t_ESP_MAC_WIFI_STA) };
    if err != ESP_OK {
        return Err(anyhow::anyhow!("Failed to read station MAC, error code: {}", err));
    }
    Ok(mac)
}

pub fn restart() -> ! {
    unsafe { esp_restart() }
}
