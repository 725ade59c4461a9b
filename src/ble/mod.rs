//! BLE GATT transport for provisioning (ESP32 only).
//!
//! Binds the platform-independent provisioning core to the NimBLE stack:
//! advertising, the write-only Credential Channel and the notify-only Status
//! Channel.

mod service;

pub use service::{
    BleAdvertiser, BleLink, CREDENTIAL_CHAR_UUID, CREDENTIAL_SERVICE_UUID, STATUS_CHAR_UUID,
    STATUS_SERVICE_UUID,
};
