//! Temperature sensing.

mod max31865;

pub use max31865::{ratio_to_resistance, resistance_to_celsius, Max31865};

use std::fmt;

/// Anything that can produce a temperature reading for the telemetry loop.
pub trait TemperatureSource {
    fn temperature_celsius(&mut self) -> Result<f32, SensorError>;
}

/// Faults while reading the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// SPI transfer failed.
    Bus(String),
    /// The converter flagged an RTD fault (open or shorted element).
    RtdFault,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(msg) => write!(f, "SPI error: {}", msg),
            Self::RtdFault => write!(f, "RTD fault flagged by the converter"),
        }
    }
}

impl std::error::Error for SensorError {}
