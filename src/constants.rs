use core::time::Duration;

// MQTT namespace
pub const TOPIC_ROOT: &str = "soilsensor";
pub const DISCOVERY_PREFIX: &str = "homeassistant";

// Home Assistant device block
pub const DEVICE_NAME: &str = "Soil Sensor";
pub const DEVICE_MANUFACTURER: &str = "soil-node";
pub const DEVICE_MODEL: &str = "ESP32-C3 Capacitive Soil Probe";
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

// NVS (keys max 15 chars)
pub const NVS_NAMESPACE: &str = "soilcfg";
pub const NVS_RECORD_KEY: &str = "data";

// Record defaults
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_SLEEP_MINUTES: u16 = 5;
pub const DEFAULT_BATT_V_MIN: f32 = 3.20;
pub const DEFAULT_BATT_V_MAX: f32 = 4.20;
pub const DEFAULT_SOIL_WET_RAW: u16 = 1200;
pub const DEFAULT_SOIL_DRY_RAW: u16 = 3200;

// Accepted ranges
pub const SLEEP_MINUTES_MAX: u16 = 1440;
pub const BATT_V_LIMIT_LOW: f32 = 2.50;
pub const BATT_V_LIMIT_HIGH: f32 = 5.50;

// ADC: 12-bit oneshot, 11 dB attenuation, battery behind a 220k/220k divider
pub const ADC_FULL_SCALE: u16 = 4095;
pub const ADC_REFERENCE_VOLTS: f32 = 3.3;
pub const VBAT_DIVIDER_RATIO: f32 = 2.0;

/// Span below which the battery range is treated as degenerate.
pub const BATT_SPAN_EPSILON: f32 = 0.001;

// Moisture acquisition window
pub const SOIL_POWER_SETTLE_MS: u32 = 1500;
pub const SOIL_SAMPLE_COUNT: u32 = 10;
pub const SOIL_SAMPLE_SPACING_MS: u32 = 80;

// Duty cycle timing
pub const CONTROL_SETTLE: Duration = Duration::from_secs(3);
pub const PUBLISH_FLUSH: Duration = Duration::from_millis(1000);
pub const NETWORK_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const CONTROL_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const AWAKE_BUDGET: Duration = Duration::from_secs(120);
pub const AWAKE_REFRESH: Duration = Duration::from_secs(60);

// Provisioning portal
pub const PORTAL_SSID_PREFIX: &str = "SoilSensor";
pub const PORTAL_RESTART_DELAY_MS: u32 = 2000;
