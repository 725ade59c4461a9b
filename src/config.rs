//! Device identity and broker parameters.
//!
//! One `DeviceConfig` value is built at startup and passed by reference into
//! the provisioning server and the telemetry reporter. The same identity is
//! used for both faces of the device: the BLE advertisement name a peer scans
//! for and the MQTT client id the broker sees.

/// Externally visible device identifier. Doubles as the BLE advertisement
/// name and the MQTT client id.
pub const DEVICE_NAME: &str = "TK-2025-MA00-0001";

/// MQTT broker hostname.
pub const BROKER_HOST: &str = "qbd56d0e.ala.us-east-1.emqxsl.com";

/// MQTT broker port reported to the provisioning peer.
pub const BROKER_PORT: u16 = 1883;

/// MQTT username.
pub const MQTT_USER: &str = "Mariano_Sanchez";

/// MQTT password.
pub const MQTT_PASSWORD: &str = "0001";

/// Identity and broker parameters handed to peers during provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Advertised device name (the device's externally visible ID).
    pub device_name: &'static str,
    /// Broker hostname the telemetry reporter connects to.
    pub broker_host: &'static str,
    /// Broker port reported over the Status Channel.
    pub broker_port: u16,
    /// Broker username reported over the Status Channel.
    pub mqtt_user: &'static str,
    /// Broker password reported over the Status Channel.
    pub mqtt_password: &'static str,
    /// Broker client id reported over the Status Channel.
    pub client_id: &'static str,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME,
            broker_host: BROKER_HOST,
            broker_port: BROKER_PORT,
            mqtt_user: MQTT_USER,
            mqtt_password: MQTT_PASSWORD,
            client_id: DEVICE_NAME,
        }
    }
}

impl DeviceConfig {
    /// MQTT broker URL for the esp-idf client.
    pub fn broker_url(&self) -> String {
        format!("mqtt://{}:{}", self.broker_host, self.broker_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_matches_advertised_name() {
        let config = DeviceConfig::default();
        assert_eq!(config.client_id, config.device_name);
    }

    #[test]
    fn test_broker_url() {
        let config = DeviceConfig::default();
        assert_eq!(
            config.broker_url(),
            format!("mqtt://{}:1883", BROKER_HOST)
        );
    }
}
