//! Open access point and setup form for unprovisioned nodes.

use std::sync::Mutex;

use anyhow::anyhow;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::{Read, Write};
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{error, info, warn};

use crate::constants::PORTAL_RESTART_DELAY_MS;
use crate::esp::nvs::NvsBlobStore;
use crate::esp::restart;
use crate::identity::DeviceIdentity;
use crate::provisioning::{parse_form, scan_response, FORM_HTML};
use crate::store::ConfigStore;

const MAX_FORM_LEN: usize = 1024;

/// Serves the setup form until a valid submission is saved, then restarts. Only returns
/// on a setup error.
pub fn serve(
    mut wifi: BlockingWifi<EspWifi<'static>>,
    store: ConfigStore<NvsBlobStore>,
    identity: &DeviceIdentity,
) -> anyhow::Result<()> {
    let ssid = identity.portal_ssid();
    let ap_config = AccessPointConfiguration {
        ssid: ssid.as_str().try_into().map_err(|_| anyhow!("AP SSID too long"))?,
        channel: 1,
        auth_method: AuthMethod::None,
        max_connections: 4,
        ..Default::default()
    };
    // station side stays idle but enables scanning
    wifi.set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap_config))?;
    wifi.start()?;

    let networks = match wifi.scan() {
        Ok(found) => scan_response(found.iter().map(|ap| ap.ssid.as_str())),
        Err(e) => {
            warn!("WiFi scan failed: {:?}", e);
            scan_response(core::iter::empty())
        }
    };
    info!("Access point started. Connect to '{}' and go to 192.168.4.1", ssid);

    let store = Mutex::new(store);
    let mut server = EspHttpServer::new(&HttpConfiguration {
        stack_size: 8192,
        max_open_sockets: 4,
        ..Default::default()
    })?;

    server.fn_handler("/", Method::Get, |req| -> anyhow::Result<()> {
        let headers = [("Content-Type", "text/html; charset=utf-8")];
        let mut resp = req.into_response(200, Some("OK"), &headers)?;
        resp.write_all(FORM_HTML.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler("/scan", Method::Get, move |req| -> anyhow::Result<()> {
        let headers = [("Content-Type", "application/json")];
        let mut resp = req.into_response(200, Some("OK"), &headers)?;
        resp.write_all(networks.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler("/", Method::Post, move |mut req| -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_FORM_LEN];
        let mut len = 0;
        while len < buf.len() {
            match req.read(&mut buf[len..])? {
                0 => break,
                n => len += n,
            }
        }
        let body = core::str::from_utf8(&buf[..len]).map_err(|_| anyhow!("form body is not UTF-8"))?;

        let mut store = store.lock().map_err(|_| anyhow!("config store lock poisoned"))?;
        let submitted = parse_form(body, &store.get());
        let saved = submitted.map_err(anyhow::Error::from).and_then(|record| {
            store.save(&record)?;
            Ok(record)
        });
        match saved {
            Ok(record) => {
                info!("Provisioned for {} via {}", record.wifi_ssid, record.mqtt_host);
                let mut resp = req.into_ok_response()?;
                resp.write_all(b"Saved. Rebooting...")?;
                resp.flush()?;
                drop(resp);
                FreeRtos::delay_ms(PORTAL_RESTART_DELAY_MS);
                restart();
            }
            Err(e) => {
                warn!("Provisioning form rejected: {:#}", e);
                let mut resp = req.into_status_response(400)?;
                resp.write_all(format!("Invalid settings: {}", e).as_bytes())?;
                Ok(())
            }
        }
    })?;

    loop {
        FreeRtos::delay_ms(1000);
        if !wifi.is_started().unwrap_or(false) {
            error!("Access point stopped unexpectedly");
            restart();
        }
    }
}
