//! The persisted configuration record and its fixed blob layout.
//!
//! The blob is little-endian, strings are NUL padded to their field width, and the last
//! four bytes are a SHA-256 prefix over everything before them. Any deviation in size,
//! version or checksum makes the blob malformed.

use core::time::Duration;

use heapless::String;
use sha2::{Digest, Sha256};

use crate::constants::*;
use crate::error::RecordError;

pub const LAYOUT_VERSION: u16 = 1;

const WIFI_FIELD: usize = 64;
const HOST_FIELD: usize = 64;
const CRED_FIELD: usize = 32;
const CHECKSUM_LEN: usize = 4;

/// Size in bytes of an encoded record.
pub const RECORD_LEN: usize = 2 // layout version
    + WIFI_FIELD * 2
    + HOST_FIELD
    + 2 // port
    + CRED_FIELD * 2
    + 2 // sleep interval
    + 4 * 2 // battery bounds
    + 2 * 2 // soil bounds
    + CHECKSUM_LEN;

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigurationRecord {
    pub wifi_ssid: String<WIFI_FIELD>,
    pub wifi_pass: String<WIFI_FIELD>,
    pub mqtt_host: String<HOST_FIELD>,
    pub mqtt_port: u16,
    pub mqtt_user: String<CRED_FIELD>,
    pub mqtt_pass: String<CRED_FIELD>,
    /// Minutes between duty cycles, 0 keeps the node awake.
    pub sleep_interval: u16,
    pub batt_v_min: f32,
    pub batt_v_max: f32,
    pub soil_wet_raw: u16,
    pub soil_dry_raw: u16,
}

impl Default for ConfigurationRecord {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: String::new(),
            mqtt_port: DEFAULT_MQTT_PORT,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            sleep_interval: DEFAULT_SLEEP_MINUTES,
            batt_v_min: DEFAULT_BATT_V_MIN,
            batt_v_max: DEFAULT_BATT_V_MAX,
            soil_wet_raw: DEFAULT_SOIL_WET_RAW,
            soil_dry_raw: DEFAULT_SOIL_DRY_RAW,
        }
    }
}

impl ConfigurationRecord {
    /// Checks the numeric invariants every persisted record must hold.
    pub fn validate(&self) -> Result<(), RecordError> {
        let in_limits = |v: f32| v.is_finite() && (BATT_V_LIMIT_LOW..=BATT_V_LIMIT_HIGH).contains(&v);
        if !in_limits(self.batt_v_min) || !in_limits(self.batt_v_max) || self.batt_v_min >= self.batt_v_max {
            return Err(RecordError::BatteryRange {
                min: self.batt_v_min,
                max: self.batt_v_max,
            });
        }
        if self.sleep_interval > SLEEP_MINUTES_MAX {
            return Err(RecordError::Invalid {
                field: "sleep_interval",
                value: self.sleep_interval.to_string(),
            });
        }
        for (field, raw) in [("soil_wet_raw", self.soil_wet_raw), ("soil_dry_raw", self.soil_dry_raw)] {
            if raw > ADC_FULL_SCALE {
                return Err(RecordError::Invalid {
                    field,
                    value: raw.to_string(),
                });
            }
        }
        Ok(())
    }

    /// True once provisioning has stored the credentials needed to attach at all.
    pub fn has_network_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty() && !self.mqtt_host.is_empty()
    }

    /// The broker host to attach to, refusing URLs such as `mqtt://host`.
    pub fn broker_host(&self) -> Result<&str, RecordError> {
        let host = self.mqtt_host.trim();
        if host.is_empty() {
            return Err(RecordError::Missing("mqtt_host"));
        }
        if host.contains("://") {
            return Err(RecordError::SchemePrefix(host.to_string()));
        }
        Ok(host)
    }

    /// Deep-sleep duration, or `None` when the node should stay awake.
    pub fn sleep_duration(&self) -> Option<Duration> {
        match self.sleep_interval {
            0 => None,
            minutes => Some(Duration::from_secs(u64::from(minutes) * 60)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_LEN);
        out.extend_from_slice(&LAYOUT_VERSION.to_le_bytes());
        put_text(&mut out, &self.wifi_ssid, WIFI_FIELD);
        put_text(&mut out, &self.wifi_pass, WIFI_FIELD);
        put_text(&mut out, &self.mqtt_host, HOST_FIELD);
        out.extend_from_slice(&self.mqtt_port.to_le_bytes());
        put_text(&mut out, &self.mqtt_user, CRED_FIELD);
        put_text(&mut out, &self.mqtt_pass, CRED_FIELD);
        out.extend_from_slice(&self.sleep_interval.to_le_bytes());
        out.extend_from_slice(&self.batt_v_min.to_le_bytes());
        out.extend_from_slice(&self.batt_v_max.to_le_bytes());
        out.extend_from_slice(&self.soil_wet_raw.to_le_bytes());
        out.extend_from_slice(&self.soil_dry_raw.to_le_bytes());

        let digest = Sha256::digest(&out);
        out.extend_from_slice(&digest[..CHECKSUM_LEN]);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_LEN {
            return Err(RecordError::SizeMismatch {
                expected: RECORD_LEN,
                actual: bytes.len(),
            });
        }
        let (body, checksum) = bytes.split_at(RECORD_LEN - CHECKSUM_LEN);
        if Sha256::digest(body)[..CHECKSUM_LEN] != *checksum {
            return Err(RecordError::Checksum);
        }

        let mut reader = Reader { bytes: body, pos: 0 };
        let version = reader.u16();
        if version != LAYOUT_VERSION {
            return Err(RecordError::UnknownVersion(version));
        }

        let record = Self {
            wifi_ssid: reader.text("wifi_ssid")?,
            wifi_pass: reader.text("wifi_pass")?,
            mqtt_host: reader.text("mqtt_host")?,
            mqtt_port: reader.u16(),
            mqtt_user: reader.text("mqtt_user")?,
            mqtt_pass: reader.text("mqtt_pass")?,
            sleep_interval: reader.u16(),
            batt_v_min: reader.f32(),
            batt_v_max: reader.f32(),
            soil_wet_raw: reader.u16(),
            soil_dry_raw: reader.u16(),
        };
        record.validate()?;
        Ok(record)
    }
}

fn put_text(out: &mut Vec<u8>, text: &str, width: usize) {
    out.extend_from_slice(text.as_bytes());
    out.resize(out.len() + (width - text.len()), 0);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    fn u16(&mut self) -> u16 {
        let b = self.take(2);
        u16::from_le_bytes([b[0], b[1]])
    }

    fn f32(&mut self) -> f32 {
        let b = self.take(4);
        f32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn text<const N: usize>(&mut self, field: &'static str) -> Result<String<N>, RecordError> {
        let raw = self.take(N);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(N);
        let text = core::str::from_utf8(&raw[..end]).map_err(|_| RecordError::NotUtf8(field))?;
        String::try_from(text).map_err(|_| RecordError::TooLong(field))
    }
}
