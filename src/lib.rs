//! Tankold ESP32 firmware library.
//!
//! This library contains the platform-independent provisioning core plus the
//! ESP32 glue that binds it to the NimBLE stack, the Wi-Fi driver, the MQTT
//! broker client and the MAX31865 temperature sensor. Everything outside the
//! `esp32` feature can be tested on the host machine without hardware.

pub mod config;
pub mod indicator;
pub mod provisioning;
pub mod sensor;
pub mod telemetry;
pub mod wifi;

#[cfg(feature = "esp32")]
pub mod ble;

// Re-export commonly used items
pub use config::DeviceConfig;
pub use provisioning::{
    Credentials, DeviceState, ProvisioningServer, ProvisioningSession, SessionEvent,
    SessionOutcome, StatusLine, TransportError,
};
pub use wifi::{JoinError, Joiner, NetworkJoiner, Station};
