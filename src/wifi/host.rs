//! Host stand-in for the station interface.
//!
//! On the host the OS owns networking, so a join "succeeds" after one poll
//! interval and reports the machine's local address. Used by the host build
//! of the provisioning binary.

use super::{JoinError, NetworkJoiner, JOIN_POLL_INTERVAL};
use crate::provisioning::Credentials;
use log::info;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::sleep;

pub struct HostJoiner {
    joined: bool,
}

impl HostJoiner {
    pub fn new() -> Self {
        Self { joined: false }
    }

    /// Local address on the default route. Creates a UDP socket and
    /// "connects" it to a public address (no packets are sent), then reads
    /// back which local address the OS picked.
    fn detect_local_ip() -> Option<Ipv4Addr> {
        use std::net::{IpAddr, UdpSocket};

        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        }
    }
}

impl Default for HostJoiner {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkJoiner for HostJoiner {
    async fn join(
        &mut self,
        credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Ipv4Addr, JoinError> {
        info!(
            "host join for '{}' (OS networking, always up)",
            credentials.network_name
        );
        sleep(JOIN_POLL_INTERVAL).await;
        self.joined = true;
        Ok(Self::detect_local_ip().unwrap_or(Ipv4Addr::LOCALHOST))
    }

    fn is_joined(&self) -> bool {
        self.joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_host_join_always_succeeds() {
        let mut joiner = HostJoiner::new();
        assert!(!joiner.is_joined());
        let credentials = Credentials::new("HomeNet".into(), "hunter2".into());
        let ip = joiner
            .join(&credentials, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(joiner.is_joined());
        assert!(!ip.is_unspecified());
    }
}
