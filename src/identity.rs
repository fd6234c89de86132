use core::fmt::{self, Write};

use heapless::String;

use crate::constants::{PORTAL_SSID_PREFIX, TOPIC_ROOT};

/// Short hex id derived from the station MAC; namespaces every topic and unique id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIdentity {
    mac: [u8; 6],
    id: String<6>,
}

impl DeviceIdentity {
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut id = String::new();
        for byte in &mac[3..] {
            // 3 bytes always fit 6 hex digits
            let _ = write!(id, "{:02x}", byte);
        }
        Self { mac, id }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// MQTT client id and Home Assistant device identifier, e.g. `soilsensor_1fa209`.
    pub fn client_id(&self) -> String<24> {
        let mut client_id = String::new();
        let _ = write!(client_id, "{}_{}", TOPIC_ROOT, self.id);
        client_id
    }

    /// SSID of the open provisioning access point, e.g. `SoilSensorA1B2`.
    pub fn portal_ssid(&self) -> String<32> {
        let mut ssid = String::new();
        let _ = write!(ssid, "{}{:02X}{:02X}", PORTAL_SSID_PREFIX, self.mac[4], self.mac[5]);
        ssid
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
