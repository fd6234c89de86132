use anyhow::anyhow;
use esp_idf_svc::ipv4::IpInfo;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use crate::platform::Network;
use crate::record::ConfigurationRecord;

/// Station-mode attach with the credentials from the stored record.
pub struct StationNetwork {
    wifi: BlockingWifi<EspWifi<'static>>,
    configured: bool,
}

impl StationNetwork {
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self { wifi, configured: false }
    }

    /// Releases the driver, e.g. for the provisioning access point.
    pub fn into_inner(self) -> BlockingWifi<EspWifi<'static>> {
        self.wifi
    }

    fn configure(&mut self, record: &ConfigurationRecord) -> anyhow::Result<()> {
        let auth_method = if record.wifi_pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: record
                .wifi_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("SSID longer than 32 bytes"))?,
            password: record
                .wifi_pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Wi-Fi password longer than 64 bytes"))?,
            auth_method,
            ..Default::default()
        });
        self.wifi.set_configuration(&wifi_config)?;
        self.configured = true;
        Ok(())
    }
}

impl Network for StationNetwork {
    fn attach(&mut self, record: &ConfigurationRecord) -> anyhow::Result<()> {
        if !self.configured {
            self.configure(record)?;
        }
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        if self.wifi.is_connected()? {
            if let Err(e) = self.wifi.disconnect() {
                warn!("WiFi disconnect before re-attach failed: {:?}", e);
            }
        }
        info!("Connecting to WiFi {}", record.wifi_ssid);
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;
        let ip_info: IpInfo = self.wifi.wifi().sta_netif().get_ip_info()?;
        info!("WiFi Connected, IP: {}", ip_info.ip);
        Ok(())
    }

    fn is_attached(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }
}
