//! Provisioning firmware binary.
//!
//! Advertises the credential service over BLE, accepts one peer at a time,
//! and reports broker connection parameters after a successful Wi-Fi join.
//!
//! - **ESP32**: `cargo espflash flash --bin provision --features esp32 --release`
//! - **Host**: `cargo run --bin provision [-- <network> <passphrase>]` runs one
//!   simulated provisioning cycle against the OS network stack.

#[cfg(feature = "esp32")]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    use esp_idf_hal::gpio::PinDriver;
    use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::units::FromValueType;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use log::info;
    use tankold_esp32::ble::BleAdvertiser;
    use tankold_esp32::indicator::LedIndicator;
    use tankold_esp32::wifi::EspStation;
    use tankold_esp32::{DeviceConfig, Joiner, ProvisioningServer};

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== Tankold provisioning firmware ===");

    let peripherals = Peripherals::take().expect("Failed to take peripherals");
    let sysloop = EspSystemEventLoop::take().expect("Failed to take system event loop");
    let config = DeviceConfig::default();

    let station =
        EspStation::new(peripherals.modem, sysloop).expect("Failed to initialize Wi-Fi");
    let joiner = Joiner::new(station);

    // Session lamp pulses on a PWM channel; joined lamp is a plain GPIO.
    let lamp_timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default()
            .frequency(5.kHz().into())
            .resolution(Resolution::Bits10),
    )
    .expect("Failed to configure lamp timer");
    let session_lamp = LedcDriver::new(
        peripherals.ledc.channel0,
        lamp_timer,
        peripherals.pins.gpio12,
    )
    .expect("Failed to configure session lamp");
    let joined_lamp = PinDriver::output(peripherals.pins.gpio14.downgrade_output())
        .expect("Failed to configure joined lamp");
    let indicator = LedIndicator::new(session_lamp, joined_lamp);

    let advertiser = BleAdvertiser::new(&config);
    let mut server = ProvisioningServer::new(advertiser, joiner, indicator, config);
    server.run().await;
}

#[cfg(not(feature = "esp32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    use log::info;
    use tankold_esp32::indicator::NullIndicator;
    use tankold_esp32::wifi::HostJoiner;
    use tankold_esp32::{DeviceConfig, ProvisioningServer};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let network = args.next().unwrap_or_else(|| "HomeNet".to_string());
    let passphrase = args.next().unwrap_or_else(|| "hunter2".to_string());

    info!("=== Tankold provisioning (host simulation) ===");

    let advertiser = sim::SimAdvertiser::new(vec![network, passphrase]);
    let mut server = ProvisioningServer::new(
        advertiser,
        HostJoiner::new(),
        NullIndicator,
        DeviceConfig::default(),
    );
    let outcome = server.cycle().await;
    info!("cycle finished: {:?}", outcome);
}

/// Scripted in-process peer, standing in for the BLE transport on the host.
#[cfg(not(feature = "esp32"))]
mod sim {
    use tankold_esp32::provisioning::{
        Advertiser, ProvisioningLink, SessionEvent, StatusLine, TransportError,
    };

    pub struct SimAdvertiser {
        writes: Option<Vec<String>>,
    }

    impl SimAdvertiser {
        pub fn new(writes: Vec<String>) -> Self {
            Self {
                writes: Some(writes),
            }
        }
    }

    impl Advertiser for SimAdvertiser {
        type Link = SimLink;

        async fn advertise(&mut self) -> Result<SimLink, TransportError> {
            let writes = self
                .writes
                .take()
                .ok_or_else(|| TransportError::Advertise("simulated peer is done".into()))?;
            println!("<- peer connected, writing credentials");
            Ok(SimLink {
                events: writes
                    .into_iter()
                    .map(|text| SessionEvent::CredentialWrite(text.into_bytes()))
                    .collect(),
            })
        }
    }

    pub struct SimLink {
        events: std::collections::VecDeque<SessionEvent>,
    }

    impl ProvisioningLink for SimLink {
        async fn exchange_mtu(&mut self, mtu: u16) -> Result<(), TransportError> {
            println!("<- MTU exchanged: {}", mtu);
            Ok(())
        }

        async fn next_event(&mut self) -> SessionEvent {
            self.events.pop_front().unwrap_or(SessionEvent::Disconnected)
        }

        async fn send_status(&mut self, line: &StatusLine) -> Result<(), TransportError> {
            println!("-> NOTIFY {}", line.to_wire());
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            println!("-> disconnected");
            Ok(())
        }

        fn peer(&self) -> &str {
            "simulated-peer"
        }
    }
}
