//! ESP32 WiFi radio.
//!
//! Wraps the ESP-IDF WiFi driver. The non-blocking `EspWifi` API is used
//! directly (not `BlockingWifi`) so the state machine owns the join
//! timeout.

use super::{RadioError, WifiRadio};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use esp_idf_sys::EspError;
use log::info;
use std::net::IpAddr;

/// Channel used when hosting.
const ACCESS_POINT_CHANNEL: u8 = 1;

/// ESP-IDF WiFi radio.
pub struct EspRadio {
    wifi: EspWifi<'static>,
}

impl EspRadio {
    /// Create the WiFi driver.
    ///
    /// # Arguments
    ///
    /// * `modem` - The WiFi/BT modem peripheral
    /// * `sysloop` - The ESP-IDF system event loop
    /// * `nvs` - NVS partition for driver calibration data
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self { wifi })
    }

    fn stop_if_started(&mut self) -> Result<(), EspError> {
        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }
        Ok(())
    }
}

impl WifiRadio for EspRadio {
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| RadioError::InvalidSsid)?,
            password: password
                .try_into()
                .map_err(|_| RadioError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        self.stop_if_started()?;
        self.wifi.set_configuration(&wifi_config)?;
        self.wifi.start()?;

        // Returns immediately; association and DHCP complete in the background
        self.wifi.connect()?;
        Ok(())
    }

    fn is_joined(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }

    fn station_addr(&self) -> Option<IpAddr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| IpAddr::V4(info.ip))
            .filter(|ip| !ip.is_unspecified())
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<IpAddr, RadioError> {
        let wifi_config = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| RadioError::InvalidSsid)?,
            auth_method: AuthMethod::None,
            channel: ACCESS_POINT_CHANNEL,
            ..Default::default()
        });

        self.stop_if_started()?;
        self.wifi.set_configuration(&wifi_config)?;
        self.wifi.start()?;

        let ip_info = self.wifi.ap_netif().get_ip_info()?;
        info!("Access point '{}' started on channel {}", ssid, ACCESS_POINT_CHANNEL);
        Ok(IpAddr::V4(ip_info.ip))
    }

    fn disable_power_save(&mut self) -> Result<(), RadioError> {
        esp_idf_sys::esp!(unsafe {
            esp_idf_sys::esp_wifi_set_ps(esp_idf_sys::wifi_ps_type_t_WIFI_PS_NONE)
        })?;
        Ok(())
    }
}
