//! MQTT reporting loop over the ESP-IDF client.

use super::{
    format_temperature, ControlCommand, CONTROL_TOPIC, KEEPALIVE, PUBLISH_INTERVAL, STATE_TOPIC,
    TEMP_TOPIC,
};
use crate::config::DeviceConfig;
use crate::sensor::TemperatureSource;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use esp_idf_sys::EspError;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Control-loop pace: commands are applied between publishes.
const TICK: Duration = Duration::from_millis(500);

/// Publishes LED state and temperature, applies control commands.
///
/// The ESP-IDF client runs its own task and reconnects on its own; every
/// broker fault here is logged and the loop keeps going.
pub struct Reporter<'d, T> {
    client: EspMqttClient<'d>,
    sensor: T,
    control_led: PinDriver<'d, AnyOutputPin, Output>,
    led_requested: Arc<AtomicBool>,
    led_on: bool,
}

impl<'d, T: TemperatureSource> Reporter<'d, T> {
    /// Connect to the broker with the identity the provisioning cycle
    /// reports to peers.
    pub fn connect(
        config: &DeviceConfig,
        sensor: T,
        control_led: PinDriver<'d, AnyOutputPin, Output>,
    ) -> Result<Self, EspError> {
        let led_requested = Arc::new(AtomicBool::new(false));
        let led_flag = led_requested.clone();

        let mqtt_config = MqttClientConfiguration {
            client_id: Some(config.client_id),
            username: Some(config.mqtt_user),
            password: Some(config.mqtt_password),
            keep_alive_interval: Some(KEEPALIVE),
            ..Default::default()
        };

        let client = EspMqttClient::new_cb(&config.broker_url(), &mqtt_config, move |event| {
            match event.payload() {
                EventPayload::Received {
                    topic: Some(topic),
                    data,
                    ..
                } if topic == CONTROL_TOPIC => match ControlCommand::parse(data) {
                    Some(ControlCommand::LedOn) => led_flag.store(true, Ordering::Relaxed),
                    Some(ControlCommand::LedOff) => led_flag.store(false, Ordering::Relaxed),
                    None => warn!("unknown control payload"),
                },
                EventPayload::Connected(_) => info!("broker connected"),
                EventPayload::Disconnected => warn!("broker disconnected"),
                _ => (),
            }
        })?;

        Ok(Self {
            client,
            sensor,
            control_led,
            led_requested,
            led_on: false,
        })
    }

    /// Serve the telemetry loop forever.
    pub fn run(&mut self) -> ! {
        // Subscribing races the broker handshake; retry until it lands.
        loop {
            match self.client.subscribe(CONTROL_TOPIC, QoS::AtMostOnce) {
                Ok(_) => break,
                Err(e) => {
                    warn!("subscribe failed, retrying: {}", e);
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }
        info!("subscribed to {}", CONTROL_TOPIC);

        let ticks_per_publish = (PUBLISH_INTERVAL.as_millis() / TICK.as_millis()) as u32;
        let mut tick = 0u32;
        loop {
            self.apply_led();
            if tick % ticks_per_publish == 0 {
                self.publish();
            }
            tick = tick.wrapping_add(1);
            thread::sleep(TICK);
        }
    }

    fn apply_led(&mut self) {
        let requested = self.led_requested.load(Ordering::Relaxed);
        if requested == self.led_on {
            return;
        }
        let result = if requested {
            self.control_led.set_high()
        } else {
            self.control_led.set_low()
        };
        match result {
            Ok(()) => {
                self.led_on = requested;
                info!("control LED {}", if requested { "on" } else { "off" });
            }
            Err(e) => warn!("control LED: {}", e),
        }
    }

    fn publish(&mut self) {
        let state = ControlCommand::state_payload(self.led_on);
        if let Err(e) = self
            .client
            .publish(STATE_TOPIC, QoS::AtMostOnce, false, state.as_bytes())
        {
            warn!("state publish failed: {}", e);
        }

        match self.sensor.temperature_celsius() {
            Ok(celsius) => {
                let payload = format_temperature(celsius);
                if let Err(e) = self
                    .client
                    .publish(TEMP_TOPIC, QoS::AtMostOnce, false, payload.as_bytes())
                {
                    warn!("temperature publish failed: {}", e);
                }
            }
            Err(e) => warn!("temperature read failed: {}", e),
        }
    }
}
