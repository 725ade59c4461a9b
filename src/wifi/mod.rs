//! Station-mode Wi-Fi joining.
//!
//! The provisioning state machine only sees the [`NetworkJoiner`] trait. The
//! generic [`Joiner`] implements the join policy — cycle the interface, start
//! an association, poll the connected flag on a fixed cadence, give up after
//! the timeout — over a [`Station`] seam, so the policy is tested on the host
//! while [`EspStation`] binds it to the ESP-IDF driver on device.

#[cfg(feature = "esp32")]
mod joiner;
#[cfg(not(feature = "esp32"))]
mod host;

#[cfg(feature = "esp32")]
pub use joiner::EspStation;
#[cfg(not(feature = "esp32"))]
pub use host::HostJoiner;

use crate::provisioning::Credentials;
use log::{debug, info};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::sleep;

/// Cadence at which the connected flag is polled during a join attempt.
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pause between disabling and re-enabling the interface, letting the driver
/// finish tearing down any previous association.
pub const INTERFACE_SETTLE: Duration = Duration::from_millis(100);

/// Capability to join a wireless network and report the current link state.
#[allow(async_fn_in_trait)]
pub trait NetworkJoiner {
    /// Attempt to associate with `credentials`, waiting at most `timeout`.
    /// Returns the assigned address as soon as the interface reports it.
    /// On timeout, the interface is left as-is (enabled, unassociated) for
    /// the caller to decide whether to retry.
    async fn join(
        &mut self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Ipv4Addr, JoinError>;

    /// Whether the station interface currently holds an association.
    fn is_joined(&self) -> bool;
}

/// Raw station interface operations, implemented per platform.
pub trait Station {
    type Error: fmt::Display;

    /// Disable the interface, dropping any existing association.
    fn power_off(&mut self) -> Result<(), Self::Error>;

    /// Re-enable the interface.
    fn power_on(&mut self) -> Result<(), Self::Error>;

    /// Begin associating with the given credentials. Non-blocking; progress
    /// is observed through [`is_associated`](Self::is_associated).
    fn start_join(&mut self, credentials: &Credentials) -> Result<(), Self::Error>;

    /// Whether the interface reports an established association.
    fn is_associated(&self) -> bool;

    /// Address assigned to the interface, once association completes.
    fn ip(&self) -> Option<Ipv4Addr>;
}

/// Join policy over a [`Station`].
///
/// Every attempt forcibly disables then re-enables the interface first, so a
/// stale association from a previous attempt cannot mask a fresh failure.
pub struct Joiner<S> {
    station: S,
}

impl<S: Station> Joiner<S> {
    pub fn new(station: S) -> Self {
        Self { station }
    }
}

impl<S: Station> NetworkJoiner for Joiner<S> {
    async fn join(
        &mut self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Ipv4Addr, JoinError> {
        self.station.power_off().map_err(JoinError::station)?;
        sleep(INTERFACE_SETTLE).await;
        self.station.power_on().map_err(JoinError::station)?;
        self.station
            .start_join(credentials)
            .map_err(JoinError::station)?;

        let attempts =
            (timeout.as_millis() / JOIN_POLL_INTERVAL.as_millis()).max(1) as u32;
        for attempt in 0..attempts {
            if self.station.is_associated() {
                if let Some(ip) = self.station.ip() {
                    info!("associated after {} polls, address {}", attempt + 1, ip);
                    return Ok(ip);
                }
            }
            debug!("association poll {}/{}", attempt + 1, attempts);
            sleep(JOIN_POLL_INTERVAL).await;
        }
        Err(JoinError::Timeout)
    }

    fn is_joined(&self) -> bool {
        self.station.is_associated()
    }
}

/// A join attempt that did not produce an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// No association within the attempt ceiling.
    Timeout,
    /// The station driver refused an operation.
    Station(String),
}

impl JoinError {
    fn station(e: impl fmt::Display) -> Self {
        Self::Station(e.to_string())
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "no association within the join timeout"),
            Self::Station(msg) => write!(f, "station driver error: {}", msg),
        }
    }
}

impl std::error::Error for JoinError {}
