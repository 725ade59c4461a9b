//! Advertise/accept loop that feeds peer connections to the state machine.

use super::session::{ProvisioningSession, SessionOutcome};
use super::{DeviceState, ProvisioningLink, TransportError};
use crate::config::DeviceConfig;
use crate::indicator::Indicator;
use crate::wifi::NetworkJoiner;
use log::{info, warn};
use std::time::Duration;
use tokio::time::sleep;

/// Pause after an advertising fault before trying again. Bounds tight
/// error-spin when the BLE stack is unhappy.
pub const ADVERTISE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Advertises the provisioning service and blocks until a peer connects.
#[allow(async_fn_in_trait)]
pub trait Advertiser {
    type Link: ProvisioningLink;

    /// Start (or restart) advertising and wait for the next peer connection.
    async fn advertise(&mut self) -> Result<Self::Link, TransportError>;
}

/// Process-wide provisioning loop: advertise, accept one peer, run a session,
/// re-advertise. Owns the device state and every collaborator the state
/// machine needs, so the whole loop can be constructed against fakes.
pub struct ProvisioningServer<A, J, I> {
    advertiser: A,
    joiner: J,
    indicator: I,
    config: DeviceConfig,
    state: DeviceState,
}

impl<A, J, I> ProvisioningServer<A, J, I>
where
    A: Advertiser,
    J: NetworkJoiner,
    I: Indicator,
{
    pub fn new(advertiser: A, joiner: J, indicator: I, config: DeviceConfig) -> Self {
        Self {
            advertiser,
            joiner,
            indicator,
            config,
            state: DeviceState::Advertising,
        }
    }

    /// Current protocol state, for diagnostics.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Serve provisioning cycles forever. There is no fatal error path: every
    /// fault ends with the device advertising again.
    pub async fn run(&mut self) {
        loop {
            self.cycle().await;
        }
    }

    /// One iteration of the loop: advertise, accept, delegate, return.
    pub async fn cycle(&mut self) -> Option<SessionOutcome> {
        self.state = DeviceState::Advertising;
        // Best-effort: reflects whatever interface state existed before this
        // cycle, not the outcome of this cycle.
        self.indicator.set_joined(self.joiner.is_joined());

        match self.advertiser.advertise().await {
            Ok(link) => {
                info!("peer connected: {}", link.peer());
                let outcome = ProvisioningSession::new(
                    link,
                    &mut self.joiner,
                    &mut self.indicator,
                    &mut self.state,
                    &self.config,
                )
                .run()
                .await;
                Some(outcome)
            }
            Err(e) => {
                warn!("{}", e);
                self.indicator.set_joined(false);
                sleep(ADVERTISE_RETRY_DELAY).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::{SessionEvent, StatusLine};
    use crate::wifi::JoinError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::rc::Rc;

    /// Minimal link whose peer immediately goes away.
    struct DropLink;

    impl ProvisioningLink for DropLink {
        async fn exchange_mtu(&mut self, _mtu: u16) -> Result<(), TransportError> {
            Ok(())
        }

        async fn next_event(&mut self) -> SessionEvent {
            SessionEvent::Disconnected
        }

        async fn send_status(&mut self, _line: &StatusLine) -> Result<(), TransportError> {
            Err(TransportError::PeerGone)
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            // Peer-initiated close already tore the link down.
            Err(TransportError::Disconnect("connection already closed".into()))
        }

        fn peer(&self) -> &str {
            "drop-peer"
        }
    }

    /// Scripted advertiser: a queue of advertise outcomes, plus a counter.
    struct ScriptAdvertiser {
        script: VecDeque<Result<(), TransportError>>,
        attempts: Rc<RefCell<usize>>,
    }

    impl Advertiser for ScriptAdvertiser {
        type Link = DropLink;

        async fn advertise(&mut self) -> Result<DropLink, TransportError> {
            *self.attempts.borrow_mut() += 1;
            match self.script.pop_front() {
                Some(Ok(())) => Ok(DropLink),
                Some(Err(e)) => Err(e),
                None => Ok(DropLink),
            }
        }
    }

    struct StuckJoiner {
        joined: bool,
    }

    impl NetworkJoiner for StuckJoiner {
        async fn join(
            &mut self,
            _credentials: &crate::provisioning::Credentials,
            _timeout: std::time::Duration,
        ) -> Result<Ipv4Addr, JoinError> {
            Err(JoinError::Timeout)
        }

        fn is_joined(&self) -> bool {
            self.joined
        }
    }

    #[derive(Default)]
    struct JoinedLog {
        history: Vec<bool>,
    }

    struct SharedIndicator(Rc<RefCell<JoinedLog>>);

    impl Indicator for SharedIndicator {
        fn session_started(&mut self) {}

        fn session_ended(&mut self) {}

        fn set_joined(&mut self, joined: bool) {
            self.0.borrow_mut().history.push(joined);
        }
    }

    fn server(
        script: Vec<Result<(), TransportError>>,
        joined: bool,
    ) -> (
        ProvisioningServer<ScriptAdvertiser, StuckJoiner, SharedIndicator>,
        Rc<RefCell<usize>>,
        Rc<RefCell<JoinedLog>>,
    ) {
        let attempts = Rc::new(RefCell::new(0));
        let log = Rc::new(RefCell::new(JoinedLog::default()));
        let advertiser = ScriptAdvertiser {
            script: script.into(),
            attempts: attempts.clone(),
        };
        let server = ProvisioningServer::new(
            advertiser,
            StuckJoiner { joined },
            SharedIndicator(log.clone()),
            DeviceConfig::default(),
        );
        (server, attempts, log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_advertise_error_backs_off_and_retries() {
        let (mut server, attempts, log) = server(
            vec![Err(TransportError::Advertise("controller busy".into())), Ok(())],
            false,
        );

        let started = tokio::time::Instant::now();
        assert_eq!(server.cycle().await, None);
        assert!(started.elapsed() >= ADVERTISE_RETRY_DELAY);

        // The loop recovers: the next cycle advertises again and serves a peer.
        assert_eq!(server.cycle().await, Some(SessionOutcome::Aborted));
        assert_eq!(*attempts.borrow(), 2);
        // The joined indicator was cleared by the advertising fault.
        assert!(log.borrow().history.contains(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_reflects_interface_state_on_indicator() {
        let (mut server, _, log) = server(vec![Ok(())], true);
        server.cycle().await;
        assert_eq!(log.borrow().history.first(), Some(&true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_session_returns_loop_to_advertising() {
        let (mut server, attempts, _) = server(vec![Ok(()), Ok(())], false);

        assert_eq!(server.cycle().await, Some(SessionOutcome::Aborted));
        assert_eq!(server.state(), DeviceState::Disconnecting);

        // Re-advertising works even though the link's disconnect reported the
        // connection as already closed.
        server.cycle().await;
        assert_eq!(*attempts.borrow(), 2);
    }
}
