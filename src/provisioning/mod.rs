//! BLE Wi-Fi provisioning core.
//!
//! An unconfigured device advertises itself, accepts one peer connection,
//! collects a network name and passphrase as two sequential writes on the
//! Credential Channel, attempts a station join, and reports the outcome over
//! the Status Channel. The whole protocol is platform-independent: the BLE
//! transport, the Wi-Fi joiner and the indicator LEDs are injected through
//! traits, so the state machine runs unchanged under the NimBLE stack on
//! device and against scripted fakes on the host.
//!
//! # State machine
//!
//! ```text
//! Advertising --peer connects--> AwaitingCredentials
//! AwaitingCredentials --two writes--> Joining
//! Joining --address assigned--> Reporting(Success) --settle--> Disconnecting
//! Joining --timeout-----------> Reporting(Failure) --> AwaitingCredentials
//! any state --peer lost--> Disconnecting --> (loop re-advertises)
//! ```
//!
//! A failed join keeps the connection open and asks for corrected credentials
//! on the same link; only success or peer loss tears the link down.

mod credentials;
mod server;
mod session;
mod status;

pub use credentials::{CredentialError, Credentials};
pub use server::{Advertiser, ProvisioningServer, ADVERTISE_RETRY_DELAY};
pub use session::{
    ProvisioningSession, SessionOutcome, JOIN_TIMEOUT, MTU_TARGET, REPORT_SETTLE_DELAY,
};
pub use status::{success_report, StatusFormatError, StatusLine, BAD_NETWORK_REASON};

use std::fmt;

/// Provisioning protocol state. Exactly one instance exists per server loop;
/// it is mutated only by the loop and the session it delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Advertising and waiting for a peer to connect.
    Advertising,
    /// Peer connected; waiting for the two credential writes.
    AwaitingCredentials,
    /// Join attempt in progress against the station interface.
    Joining,
    /// Pushing the outcome report over the Status Channel.
    Reporting,
    /// Tearing the connection down and returning to the server loop.
    Disconnecting,
}

/// One observable event on an active peer connection.
///
/// Credential writes carry the raw characteristic payload; rapid writes are
/// captured individually and delivered in submission order, never coalesced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The peer wrote the Credential Channel characteristic.
    CredentialWrite(Vec<u8>),
    /// The peer connection is gone.
    Disconnected,
}

/// One active link to a single provisioning peer.
///
/// Implementations must queue credential writes that arrive while the session
/// is busy (joining, reporting) and hand them out in submission order from
/// [`next_event`](ProvisioningLink::next_event). `send_status` performs one
/// write-then-notify pair and completes only once the notification has been
/// handed to the transport, so callers can rely on notification ordering by
/// awaiting each call before issuing the next.
#[allow(async_fn_in_trait)]
pub trait ProvisioningLink {
    /// Renegotiate the ATT MTU for this session. Failure means the peer kept
    /// the default MTU; the session continues either way.
    async fn exchange_mtu(&mut self, mtu: u16) -> Result<(), TransportError>;

    /// Wait for the next event from the peer.
    async fn next_event(&mut self) -> SessionEvent;

    /// Deliver one `KEY:VALUE` line over the Status Channel.
    async fn send_status(&mut self, line: &StatusLine) -> Result<(), TransportError>;

    /// Tear the connection down. Must tolerate an already-closed connection.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Short peer label for logs.
    fn peer(&self) -> &str;
}

/// Faults raised by the BLE transport. All of them are recoverable: the
/// session logs the fault and falls through to Disconnecting so the server
/// loop can re-advertise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Starting or restarting advertisement failed.
    Advertise(String),
    /// Writing or notifying the status characteristic failed.
    Notify(String),
    /// MTU renegotiation failed or was refused by the peer.
    Mtu(String),
    /// Tearing down the connection failed.
    Disconnect(String),
    /// The peer is no longer connected.
    PeerGone,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advertise(msg) => write!(f, "advertising failed: {}", msg),
            Self::Notify(msg) => write!(f, "status notify failed: {}", msg),
            Self::Mtu(msg) => write!(f, "MTU exchange failed: {}", msg),
            Self::Disconnect(msg) => write!(f, "disconnect failed: {}", msg),
            Self::PeerGone => write!(f, "peer disconnected"),
        }
    }
}

impl std::error::Error for TransportError {}
