//! Status Channel payloads.
//!
//! Each status line is one `KEY:VALUE` UTF-8 payload carried by a single
//! notification. A successful cycle reports the five connection parameters
//! the companion app needs to reach the broker; a failed cycle reports one
//! `Error` line and the session asks for credentials again.

use crate::config::DeviceConfig;
use std::fmt;
use std::net::Ipv4Addr;

/// Failure reason sent to the peer when a join attempt does not produce an
/// address. The companion app matches this text verbatim.
pub const BAD_NETWORK_REASON: &str = "Datos de red incorrectos";

/// One `KEY:VALUE` line on the Status Channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// Address the station interface was assigned.
    Ip(Ipv4Addr),
    /// Broker port the device will publish to.
    Port(u16),
    /// Broker username.
    User(String),
    /// Broker password.
    Password(String),
    /// Broker client id.
    ClientId(String),
    /// Provisioning failure reason.
    Error(String),
}

impl StatusLine {
    /// The wire key for this line.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ip(_) => "IP",
            Self::Port(_) => "PORT",
            Self::User(_) => "USER",
            Self::Password(_) => "PASSWORD",
            Self::ClientId(_) => "CLIENT_ID",
            Self::Error(_) => "Error",
        }
    }

    /// Serialize to the `KEY:VALUE` wire form.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Ip(ip) => format!("IP:{}", ip),
            Self::Port(port) => format!("PORT:{}", port),
            Self::User(user) => format!("USER:{}", user),
            Self::Password(password) => format!("PASSWORD:{}", password),
            Self::ClientId(id) => format!("CLIENT_ID:{}", id),
            Self::Error(reason) => format!("Error:{}", reason),
        }
    }

    /// Parse a wire line back into a status value.
    pub fn parse(line: &str) -> Result<Self, StatusFormatError> {
        let (key, value) = line
            .split_once(':')
            .ok_or(StatusFormatError::MissingSeparator)?;
        match key {
            "IP" => value
                .parse()
                .map(Self::Ip)
                .map_err(|_| StatusFormatError::InvalidValue {
                    key: "IP",
                    value: value.to_string(),
                }),
            "PORT" => value
                .parse()
                .map(Self::Port)
                .map_err(|_| StatusFormatError::InvalidValue {
                    key: "PORT",
                    value: value.to_string(),
                }),
            "USER" => Ok(Self::User(value.to_string())),
            "PASSWORD" => Ok(Self::Password(value.to_string())),
            "CLIENT_ID" => Ok(Self::ClientId(value.to_string())),
            "Error" => Ok(Self::Error(value.to_string())),
            _ => Err(StatusFormatError::UnknownKey(key.to_string())),
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// The full success report, IP first. The peer must observe the address
/// before the link is torn down; the remaining parameters follow in a fixed
/// order and are all delivered before disconnection.
pub fn success_report(ip: Ipv4Addr, config: &DeviceConfig) -> [StatusLine; 5] {
    [
        StatusLine::Ip(ip),
        StatusLine::Port(config.broker_port),
        StatusLine::User(config.mqtt_user.to_string()),
        StatusLine::Password(config.mqtt_password.to_string()),
        StatusLine::ClientId(config.client_id.to_string()),
    ]
}

/// Malformed status line encountered while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFormatError {
    /// No `:` separator in the line.
    MissingSeparator,
    /// Key is not one of the defined status keys.
    UnknownKey(String),
    /// Value does not parse for the given key.
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for StatusFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator => write!(f, "missing ':' separator"),
            Self::UnknownKey(key) => write!(f, "unknown status key: {}", key),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid {} value: {}", key, value)
            }
        }
    }
}

impl std::error::Error for StatusFormatError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            StatusLine::Ip(Ipv4Addr::new(192, 168, 1, 42)).to_wire(),
            "IP:192.168.1.42"
        );
        assert_eq!(StatusLine::Port(1883).to_wire(), "PORT:1883");
        assert_eq!(
            StatusLine::Error(BAD_NETWORK_REASON.to_string()).to_wire(),
            "Error:Datos de red incorrectos"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let lines = [
            StatusLine::Ip(Ipv4Addr::new(10, 0, 0, 7)),
            StatusLine::Port(1883),
            StatusLine::User("Mariano_Sanchez".into()),
            StatusLine::Password("0001".into()),
            StatusLine::ClientId("TK-2025-MA00-0001".into()),
            StatusLine::Error("Datos de red incorrectos".into()),
        ];
        for line in lines {
            assert_eq!(StatusLine::parse(&line.to_wire()).unwrap(), line);
        }
    }

    #[test]
    fn test_parse_missing_separator() {
        assert_eq!(
            StatusLine::parse("IP192.168.1.1"),
            Err(StatusFormatError::MissingSeparator)
        );
    }

    #[test]
    fn test_parse_unknown_key() {
        assert!(matches!(
            StatusLine::parse("SSID:HomeNet"),
            Err(StatusFormatError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_parse_bad_port() {
        assert!(matches!(
            StatusLine::parse("PORT:none"),
            Err(StatusFormatError::InvalidValue { key: "PORT", .. })
        ));
    }

    #[test]
    fn test_success_report_order_and_keys() {
        let config = DeviceConfig::default();
        let report = success_report(Ipv4Addr::new(192, 168, 1, 42), &config);
        let keys: Vec<_> = report.iter().map(|line| line.key()).collect();
        assert_eq!(keys, ["IP", "PORT", "USER", "PASSWORD", "CLIENT_ID"]);
        assert_eq!(report[0].to_wire(), "IP:192.168.1.42");
    }
}
