//! Telemetry firmware binary.
//!
//! Joins Wi-Fi with compile-time credentials, reads the Pt100 RTD through a
//! MAX31865, and talks to the MQTT broker: temperature and LED state out,
//! control commands in.
//!
//! Usage:
//!   WIFI_SSID="MyNetwork" WIFI_PASSPHRASE="secret" \
//!     cargo espflash flash --bin telemetry --features esp32 --release

/// Wi-Fi network name - set via WIFI_SSID environment variable at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// Wi-Fi passphrase - set via WIFI_PASSPHRASE environment variable at compile
/// time. Empty for open networks.
#[cfg(feature = "esp32")]
const WIFI_PASSPHRASE: Option<&str> = option_env!("WIFI_PASSPHRASE");

/// Print error message and exit. Pauses briefly so espflash monitor shows the
/// output before the process terminates.
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    use esp_idf_hal::gpio::PinDriver;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
    use esp_idf_hal::units::FromValueType;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use log::{info, warn};
    use tankold_esp32::provisioning::JOIN_TIMEOUT;
    use tankold_esp32::sensor::Max31865;
    use tankold_esp32::telemetry::Reporter;
    use tankold_esp32::wifi::{EspStation, NetworkJoiner};
    use tankold_esp32::{Credentials, DeviceConfig, Joiner};

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== Tankold telemetry firmware ===");

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => halt_with_error(
            "Error: WIFI_SSID not set at compile time.\n\n\
             Usage:\n  \
             WIFI_SSID=\"MyNetwork\" WIFI_PASSPHRASE=\"secret\" \
             cargo espflash flash --bin telemetry --features esp32",
        ),
    };
    let credentials = Credentials::new(
        ssid.to_string(),
        WIFI_PASSPHRASE.unwrap_or("").to_string(),
    );
    if let Err(e) = credentials.validate() {
        halt_with_error(&format!("Error: {}", e));
    }

    let peripherals = Peripherals::take().expect("Failed to take peripherals");
    let sysloop = EspSystemEventLoop::take().expect("Failed to take system event loop");
    let config = DeviceConfig::default();

    let station =
        EspStation::new(peripherals.modem, sysloop).expect("Failed to initialize Wi-Fi");
    let mut joiner = Joiner::new(station);
    let ip = loop {
        match joiner.join(&credentials, JOIN_TIMEOUT).await {
            Ok(ip) => break ip,
            Err(e) => {
                warn!("{}, retrying", e);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    };
    info!("network up, address {}", ip);

    // MAX31865 on VSPI, mode 1, chip select on GPIO5.
    let spi = SpiDriver::new(
        peripherals.spi3,
        peripherals.pins.gpio18,
        peripherals.pins.gpio23,
        Some(peripherals.pins.gpio19),
        &SpiDriverConfig::new(),
    )
    .expect("Failed to initialize SPI");
    let spi_device = SpiDeviceDriver::new(
        spi,
        Some(peripherals.pins.gpio5),
        &SpiConfig::new()
            .baudrate(400.kHz().into())
            .data_mode(embedded_hal::spi::MODE_1),
    )
    .expect("Failed to configure SPI device");
    let mut sensor = Max31865::new(spi_device, false);
    sensor.init().expect("Failed to configure MAX31865");

    let control_led = PinDriver::output(peripherals.pins.gpio13.downgrade_output())
        .expect("Failed to configure control LED");

    let mut reporter =
        Reporter::connect(&config, sensor, control_led).expect("Failed to start MQTT client");
    reporter.run();
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  WIFI_SSID=\"MyNetwork\" WIFI_PASSPHRASE=\"secret\" \
         cargo espflash flash --bin telemetry --features esp32"
    );
    std::process::exit(1);
}
