//! Provisioning boundary: the setup form and the parser that turns a submission into a
//! record. The access point and HTTP server serving it live in `esp::portal`.

use heapless::String;

use crate::constants::SLEEP_MINUTES_MAX;
use crate::error::RecordError;
use crate::record::ConfigurationRecord;

/// Most networks a `/scan` response lists.
pub const SCAN_LIMIT: usize = 20;

pub const FORM_HTML: &str = r#"<!DOCTYPE html><html><head><meta name='viewport' content='width=device-width, initial-scale=1'>
<script>
async function scanNetworks() {
  const res = await fetch('/scan');
  const data = await res.json();
  const select = document.getElementById('ssid_list');
  select.innerHTML = '';
  data.forEach(ssid => {
    const opt = document.createElement('option');
    opt.value = ssid; opt.text = ssid;
    select.appendChild(opt);
  });
}
</script></head><body>
<h2>Soil Sensor Setup</h2>
<button onclick='scanNetworks()'>Scan networks</button><br><br>
<form method='POST'>
SSID:<br><select id='ssid_list' name='ssid'><option value=''>-- select a network --</option></select><br>
Wi-Fi password:<br><input name='password' type='password'><br>
MQTT host:<br><input name='mqtt_host'><br>
MQTT port:<br><input name='mqtt_port' type='number' value='1883'><br>
MQTT user:<br><input name='mqtt_user'><br>
MQTT password:<br><input name='mqtt_pass' type='password'><br>
Sleep interval (minutes):<br><input name='sleep_interval' type='number' value='5'><br><br>
<input type='submit' value='Save &amp; Reboot'>
</form></body></html>"#;

/// Builds a record from an `application/x-www-form-urlencoded` submission.
///
/// Network and broker fields come from the form; calibration is carried over from `base`.
pub fn parse_form(body: &str, base: &ConfigurationRecord) -> Result<ConfigurationRecord, RecordError> {
    let mut record = base.clone();
    let mut port = None;
    let mut sleep = None;

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode_component(value)?;
        match key {
            "ssid" => record.wifi_ssid = bounded("ssid", value.trim())?,
            "password" => record.wifi_pass = bounded("password", &value)?,
            "mqtt_host" => record.mqtt_host = bounded("mqtt_host", value.trim())?,
            "mqtt_port" => port = Some(value),
            "mqtt_user" => record.mqtt_user = bounded("mqtt_user", value.trim())?,
            "mqtt_pass" => record.mqtt_pass = bounded("mqtt_pass", &value)?,
            "sleep_interval" => sleep = Some(value),
            other => log::debug!("Ignoring form field {}", other),
        }
    }

    if record.wifi_ssid.is_empty() {
        return Err(RecordError::Missing("ssid"));
    }
    record.broker_host()?;

    if let Some(port) = port.filter(|p| !p.trim().is_empty()) {
        record.mqtt_port = match port.trim().parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => return Err(RecordError::Invalid { field: "mqtt_port", value: port }),
        };
    }
    if let Some(sleep) = sleep.filter(|s| !s.trim().is_empty()) {
        record.sleep_interval = match sleep.trim().parse::<u16>() {
            Ok(m) if m <= SLEEP_MINUTES_MAX => m,
            _ => return Err(RecordError::Invalid { field: "sleep_interval", value: sleep }),
        };
    }

    record.validate()?;
    Ok(record)
}

/// JSON array of SSIDs for the `/scan` endpoint.
pub fn scan_response<'a, I>(ssids: I) -> std::string::String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = Vec::new();
    for ssid in ssids {
        if !ssid.is_empty() && !names.contains(&ssid) && names.len() < SCAN_LIMIT {
            names.push(ssid);
        }
    }
    serde_json::to_string(&names).unwrap_or_else(|_| "[]".into())
}

fn bounded<const N: usize>(field: &'static str, value: &str) -> Result<String<N>, RecordError> {
    String::try_from(value).map_err(|_| RecordError::TooLong(field))
}

fn decode_component(raw: &str) -> Result<std::string::String, RecordError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = core::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => out.push(b),
                    None => return Err(RecordError::Invalid { field: "form", value: raw.to_string() }),
                }
                i += 2;
            }
            b'%' => return Err(RecordError::Invalid { field: "form", value: raw.to_string() }),
            b => out.push(b),
        }
        i += 1;
    }
    std::string::String::from_utf8(out).map_err(|_| RecordError::NotUtf8("form"))
}
