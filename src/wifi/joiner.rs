//! ESP-IDF station interface binding.

use super::Station;
use crate::provisioning::Credentials;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::EspError;
use log::info;
use std::fmt;
use std::net::Ipv4Addr;

/// [`Station`] over the ESP-IDF Wi-Fi driver.
pub struct EspStation<'a> {
    wifi: EspWifi<'a>,
}

impl<'a> EspStation<'a> {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop, None)?;
        Ok(Self { wifi })
    }
}

impl Station for EspStation<'_> {
    type Error = StationError;

    fn power_off(&mut self) -> Result<(), StationError> {
        if self.wifi.is_started().unwrap_or(false) {
            self.wifi.stop()?;
        }
        Ok(())
    }

    fn power_on(&mut self) -> Result<(), StationError> {
        self.wifi.start()?;
        Ok(())
    }

    fn start_join(&mut self, credentials: &Credentials) -> Result<(), StationError> {
        info!("associating with '{}'", credentials.network_name);

        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .network_name
                .as_str()
                .try_into()
                .map_err(|_| StationError::InvalidName)?,
            password: credentials
                .passphrase
                .as_str()
                .try_into()
                .map_err(|_| StationError::InvalidPassphrase)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config)?;
        self.wifi.connect()?;
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn ip(&self) -> Option<Ipv4Addr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
    }
}

/// Errors from the ESP-IDF station driver.
#[derive(Debug)]
pub enum StationError {
    /// Network name does not fit the driver's SSID buffer.
    InvalidName,
    /// Passphrase does not fit the driver's passphrase buffer.
    InvalidPassphrase,
    /// Underlying ESP-IDF error.
    Esp(EspError),
}

impl From<EspError> for StationError {
    fn from(e: EspError) -> Self {
        Self::Esp(e)
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "invalid network name"),
            Self::InvalidPassphrase => write!(f, "invalid passphrase"),
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for StationError {}
