//! MAX31865 RTD-to-digital converter driver.
//!
//! The converter sits on SPI mode 1 and exposes a 15-bit ratiometric RTD
//! reading. The driver is generic over [`embedded_hal::spi::SpiDevice`]; the
//! conversion math is in free functions so it can be checked on the host
//! against Pt100 calibration points.

use super::{SensorError, TemperatureSource};
use embedded_hal::spi::{Operation, SpiDevice};
use std::fmt::Debug;

/// Configuration register address.
const REG_CONFIG: u8 = 0x00;

/// RTD data MSB register address.
const REG_RTD_MSB: u8 = 0x01;

/// OR-ed into a register address for writes.
const WRITE_FLAG: u8 = 0x80;

/// Vbias on, auto conversion, fault status clear, 50 Hz filter.
const CONFIG_BASE: u8 = 0b1100_0011;

/// 3-wire RTD connection bit.
const CONFIG_3WIRE: u8 = 1 << 4;

/// Nominal Pt100 resistance at 0 °C.
pub const RTD_NOMINAL_OHMS: f64 = 100.0;

/// Reference resistor on the carrier board.
pub const REFERENCE_OHMS: f64 = 430.0;

// Callendar-Van Dusen coefficients for Pt100.
const CVD_A: f64 = 3.9083e-3;
const CVD_B: f64 = -5.775e-7;

/// Resistance for a raw 15-bit ratiometric reading.
pub fn ratio_to_resistance(raw: u16, reference_ohms: f64) -> f64 {
    raw as f64 / 32768.0 * reference_ohms
}

/// Invert the Callendar-Van Dusen quadratic to get °C from resistance.
pub fn resistance_to_celsius(resistance: f64, nominal_ohms: f64) -> f64 {
    let r = resistance / nominal_ohms;
    let p2 = CVD_A / CVD_B / 2.0;
    let q = (1.0 - r) / CVD_B;
    -p2 - (p2 * p2 - q).sqrt()
}

/// Pt100 RTD front-end on a dedicated SPI device.
pub struct Max31865<SPI> {
    spi: SPI,
    three_wire: bool,
}

impl<SPI> Max31865<SPI>
where
    SPI: SpiDevice<u8>,
    SPI::Error: Debug,
{
    pub fn new(spi: SPI, three_wire: bool) -> Self {
        Self { spi, three_wire }
    }

    /// Write the configuration register and start continuous conversion.
    pub fn init(&mut self) -> Result<(), SensorError> {
        let mut config = CONFIG_BASE;
        if self.three_wire {
            config |= CONFIG_3WIRE;
        }
        self.spi
            .write(&[REG_CONFIG | WRITE_FLAG, config])
            .map_err(bus_error)
    }

    /// Raw 15-bit RTD reading. The LSB of the data pair is the fault flag.
    pub fn read_raw(&mut self) -> Result<u16, SensorError> {
        let mut rtd = [0u8; 2];
        self.spi
            .transaction(&mut [Operation::Write(&[REG_RTD_MSB]), Operation::Read(&mut rtd)])
            .map_err(bus_error)?;

        let word = u16::from_be_bytes(rtd);
        if word & 1 != 0 {
            return Err(SensorError::RtdFault);
        }
        Ok(word >> 1)
    }

    /// Temperature of the RTD element in °C.
    pub fn temperature(&mut self) -> Result<f64, SensorError> {
        let raw = self.read_raw()?;
        let resistance = ratio_to_resistance(raw, REFERENCE_OHMS);
        Ok(resistance_to_celsius(resistance, RTD_NOMINAL_OHMS))
    }
}

fn bus_error(e: impl Debug) -> SensorError {
    SensorError::Bus(format!("{:?}", e))
}

impl<SPI> TemperatureSource for Max31865<SPI>
where
    SPI: SpiDevice<u8>,
    SPI::Error: Debug,
{
    fn temperature_celsius(&mut self) -> Result<f32, SensorError> {
        self.temperature().map(|celsius| celsius as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pt100 resistance at T, per the quadratic this module inverts.
    fn pt100_resistance(celsius: f64) -> f64 {
        RTD_NOMINAL_OHMS * (1.0 + CVD_A * celsius + CVD_B * celsius * celsius)
    }

    #[test]
    fn test_zero_celsius_at_nominal_resistance() {
        let t = resistance_to_celsius(100.0, RTD_NOMINAL_OHMS);
        assert!(t.abs() < 0.01, "got {}", t);
    }

    #[test]
    fn test_hundred_celsius() {
        let t = resistance_to_celsius(pt100_resistance(100.0), RTD_NOMINAL_OHMS);
        assert!((t - 100.0).abs() < 0.01, "got {}", t);
    }

    #[test]
    fn test_negative_temperature() {
        let t = resistance_to_celsius(pt100_resistance(-40.0), RTD_NOMINAL_OHMS);
        assert!((t + 40.0).abs() < 0.01, "got {}", t);
    }

    #[test]
    fn test_ratio_scaling() {
        // Half-scale reading equals half the reference resistor.
        let r = ratio_to_resistance(0x4000, REFERENCE_OHMS);
        assert!((r - 215.0).abs() < 0.01, "got {}", r);
    }
}
