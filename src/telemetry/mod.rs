//! Broker telemetry: publish temperature and LED state, accept control
//! commands.
//!
//! The broker-facing loop lives in [`reporter`] (ESP32 only); the protocol
//! pieces here — topics, command parsing, payload formatting — are
//! platform-independent and host-tested.

#[cfg(feature = "esp32")]
mod reporter;

#[cfg(feature = "esp32")]
pub use reporter::Reporter;

use std::time::Duration;

/// Topic carrying LED on/off commands from the companion app.
pub const CONTROL_TOPIC: &str = "Control";

/// Topic the LED state is published to.
pub const STATE_TOPIC: &str = "Estado";

/// Topic the temperature is published to.
pub const TEMP_TOPIC: &str = "Temp";

/// Cadence of state/temperature publications.
pub const PUBLISH_INTERVAL: Duration = Duration::from_secs(5);

/// MQTT keepalive.
pub const KEEPALIVE: Duration = Duration::from_secs(60);

/// A command received on the control topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    LedOn,
    LedOff,
}

impl ControlCommand {
    /// Parse a control payload. Unknown payloads yield `None` and are
    /// ignored by the reporter.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match std::str::from_utf8(payload).ok()?.trim() {
            "1" => Some(Self::LedOn),
            "0" => Some(Self::LedOff),
            _ => None,
        }
    }

    /// Payload published back on the state topic.
    pub fn state_payload(on: bool) -> &'static str {
        if on {
            "1"
        } else {
            "0"
        }
    }
}

/// Temperature payload: integer degrees Celsius.
pub fn format_temperature(celsius: f32) -> String {
    format!("{:.0}", celsius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_on_off() {
        assert_eq!(ControlCommand::parse(b"1"), Some(ControlCommand::LedOn));
        assert_eq!(ControlCommand::parse(b"0"), Some(ControlCommand::LedOff));
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        assert_eq!(
            ControlCommand::parse(b" 1\r\n"),
            Some(ControlCommand::LedOn)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_payloads() {
        assert_eq!(ControlCommand::parse(b"2"), None);
        assert_eq!(ControlCommand::parse(b"on"), None);
        assert_eq!(ControlCommand::parse(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_state_payload() {
        assert_eq!(ControlCommand::state_payload(true), "1");
        assert_eq!(ControlCommand::state_payload(false), "0");
    }

    #[test]
    fn test_temperature_rounds_to_whole_degrees() {
        assert_eq!(format_temperature(23.6), "24");
        assert_eq!(format_temperature(-0.2), "-0");
        assert_eq!(format_temperature(100.0), "100");
    }
}
