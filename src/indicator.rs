//! Visual provisioning indicators.
//!
//! Two lamps: a session lamp that glows while a peer is connected, and a
//! joined lamp that reflects whether the station interface holds an
//! association. Only the provisioning state machine and the server loop
//! drive them, through the [`Indicator`] seam.

/// Physical or simulated indicator lamps.
pub trait Indicator {
    /// A peer connected; a provisioning session is in progress.
    fn session_started(&mut self);

    /// The session ended and the connection is going down.
    fn session_ended(&mut self);

    /// The joined lamp: on when the network is joined, off otherwise.
    fn set_joined(&mut self, joined: bool);
}

/// No-op indicator for headless builds.
pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn session_started(&mut self) {}

    fn session_ended(&mut self) {}

    fn set_joined(&mut self, _joined: bool) {}
}

#[cfg(feature = "esp32")]
pub use esp::LedIndicator;

#[cfg(feature = "esp32")]
mod esp {
    use super::Indicator;
    use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
    use esp_idf_hal::ledc::LedcDriver;
    use log::warn;

    /// PWM duty for the session lamp while a peer is connected.
    const SESSION_LAMP_DUTY: u32 = 150;

    /// Session lamp on a PWM channel, joined lamp on a plain GPIO.
    pub struct LedIndicator<'d> {
        session_lamp: LedcDriver<'d>,
        joined_lamp: PinDriver<'d, AnyOutputPin, Output>,
    }

    impl<'d> LedIndicator<'d> {
        pub fn new(
            session_lamp: LedcDriver<'d>,
            joined_lamp: PinDriver<'d, AnyOutputPin, Output>,
        ) -> Self {
            Self {
                session_lamp,
                joined_lamp,
            }
        }
    }

    impl Indicator for LedIndicator<'_> {
        fn session_started(&mut self) {
            if let Err(e) = self.session_lamp.set_duty(SESSION_LAMP_DUTY) {
                warn!("session lamp: {}", e);
            }
        }

        fn session_ended(&mut self) {
            if let Err(e) = self.session_lamp.set_duty(0) {
                warn!("session lamp: {}", e);
            }
        }

        fn set_joined(&mut self, joined: bool) {
            let result = if joined {
                self.joined_lamp.set_high()
            } else {
                self.joined_lamp.set_low()
            };
            if let Err(e) = result {
                warn!("joined lamp: {}", e);
            }
        }
    }
}
