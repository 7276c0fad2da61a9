// WiFi link
// Access point for pairing, station for operation. Nothing here waits for
// association; the controller's health check polls `is_connected`.

use anyhow::{anyhow, Result};
use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{debug, info, warn};

use crate::hal::NetworkLink;

pub struct EspWifiLink {
    wifi: EspWifi<'static>,
    mac: [u8; 6],
    station: bool,
}

impl EspWifiLink {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        mac: [u8; 6],
    ) -> Result<Self> {
        info!("Initializing WiFi driver");
        let wifi = EspWifi::new(modem, sys_loop, Some(nvs))?;
        Ok(Self {
            wifi,
            mac,
            station: false,
        })
    }

    fn auth_method(password: &str) -> AuthMethod {
        if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        }
    }
}

impl NetworkLink for EspWifiLink {
    fn start_station(&mut self, ssid: &str, password: &str, hostname: &str) -> Result<()> {
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| anyhow!("SSID too long"))?,
                password: password.try_into().map_err(|_| anyhow!("network password too long"))?,
                auth_method: Self::auth_method(password),
                ..Default::default()
            }))?;

        if let Err(e) = self.wifi.sta_netif_mut().set_hostname(hostname) {
            warn!("⚠️ Could not set hostname '{}': {:?}", hostname, e);
        }

        self.wifi.start()?;
        self.wifi.connect()?;
        self.station = true;
        info!("📶 Station started, associating with '{}'", ssid);
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<()> {
        self.wifi
            .set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|_| anyhow!("access point SSID too long"))?,
                password: password
                    .try_into()
                    .map_err(|_| anyhow!("access point password too long"))?,
                auth_method: AuthMethod::WPA2Personal,
                channel: 1,
                ..Default::default()
            }))?;
        self.wifi.start()?;
        info!("📡 Access point '{}' started", ssid);
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        let associated = self.wifi.is_connected().unwrap_or(false);
        let has_address = self.wifi.sta_netif().is_up().unwrap_or(false);
        if self.station && !associated {
            // The driver does not reconnect on its own after a drop
            if let Err(e) = self.wifi.connect() {
                debug!("WiFi reconnect request not accepted: {:?}", e);
            }
        }
        associated && has_address
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac
    }
}
