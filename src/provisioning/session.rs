//! One provisioning cycle: collect credentials, join, report, disconnect.

use super::credentials::{decode_write, Credentials};
use super::status::{success_report, StatusLine, BAD_NETWORK_REASON};
use super::{DeviceState, ProvisioningLink, SessionEvent, TransportError};
use crate::config::DeviceConfig;
use crate::indicator::Indicator;
use crate::wifi::NetworkJoiner;
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::sleep;

/// ATT MTU requested at session start. Peers that refuse keep the default.
pub const MTU_TARGET: u16 = 512;

/// Join attempt ceiling: 20 polls of the station interface at 500 ms.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after the last success notification so the transport can flush it
/// to the peer before the link is torn down.
pub const REPORT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// How a provisioning cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Join succeeded and the full success report was delivered.
    Provisioned,
    /// The peer disconnected, or the transport failed, before a full report.
    Aborted,
}

/// Drives one peer connection through the provisioning state machine.
///
/// Owns the link for the duration of the cycle; the joiner, the indicator
/// and the device state are borrowed from the server loop. No failure inside
/// the cycle escapes [`run`](Self::run) — every fault ends in the
/// Disconnecting transition so the loop can re-advertise.
pub struct ProvisioningSession<'a, L, J, I> {
    link: L,
    joiner: &'a mut J,
    indicator: &'a mut I,
    state: &'a mut DeviceState,
    config: &'a DeviceConfig,
}

impl<'a, L, J, I> ProvisioningSession<'a, L, J, I>
where
    L: ProvisioningLink,
    J: NetworkJoiner,
    I: Indicator,
{
    pub fn new(
        link: L,
        joiner: &'a mut J,
        indicator: &'a mut I,
        state: &'a mut DeviceState,
        config: &'a DeviceConfig,
    ) -> Self {
        Self {
            link,
            joiner,
            indicator,
            state,
            config,
        }
    }

    /// Run the cycle to completion and tear the connection down.
    pub async fn run(mut self) -> SessionOutcome {
        info!("provisioning session started for {}", self.link.peer());
        self.indicator.session_started();

        let outcome = self.drive().await;

        self.enter(DeviceState::Disconnecting);
        if !self.joiner.is_joined() {
            self.indicator.set_joined(false);
        }
        self.indicator.session_ended();
        if let Err(e) = self.link.disconnect().await {
            // An already-closed connection lands here; the loop re-advertises
            // regardless.
            debug!("disconnect: {}", e);
        }
        info!("provisioning session ended: {:?}", outcome);
        outcome
    }

    async fn drive(&mut self) -> SessionOutcome {
        if let Err(e) = self.link.exchange_mtu(MTU_TARGET).await {
            warn!("continuing with default MTU: {}", e);
        }

        loop {
            self.enter(DeviceState::AwaitingCredentials);
            debug!("waiting for credentials");

            let network_name = match self.next_credential().await {
                Some(text) => text,
                None => return SessionOutcome::Aborted,
            };
            let passphrase = match self.next_credential().await {
                Some(text) => text,
                None => return SessionOutcome::Aborted,
            };
            let credentials = Credentials::new(network_name, passphrase);

            if let Err(e) = credentials.validate() {
                info!("rejecting credentials without a join attempt: {}", e);
                self.enter(DeviceState::Reporting);
                if self.report_failure().await.is_err() {
                    return SessionOutcome::Aborted;
                }
                continue;
            }

            self.enter(DeviceState::Joining);
            info!("joining network '{}'", credentials.network_name);
            match self.joiner.join(&credentials, JOIN_TIMEOUT).await {
                Ok(ip) => {
                    info!("joined, address {}", ip);
                    self.enter(DeviceState::Reporting);
                    self.indicator.set_joined(true);
                    return match self.report_success(ip).await {
                        Ok(()) => SessionOutcome::Provisioned,
                        Err(e) => {
                            warn!("success report interrupted: {}", e);
                            SessionOutcome::Aborted
                        }
                    };
                }
                Err(e) => {
                    warn!("join failed: {}", e);
                    self.enter(DeviceState::Reporting);
                    self.indicator.set_joined(false);
                    if let Err(e) = self.report_failure().await {
                        warn!("failure report interrupted: {}", e);
                        return SessionOutcome::Aborted;
                    }
                    // Same connection, corrected credentials.
                }
            }
        }
    }

    /// Pull the next credential write off the link, in submission order.
    /// Returns `None` when the peer is gone.
    async fn next_credential(&mut self) -> Option<String> {
        match self.link.next_event().await {
            SessionEvent::CredentialWrite(raw) => Some(decode_write(&raw)),
            SessionEvent::Disconnected => {
                info!("peer disconnected");
                None
            }
        }
    }

    /// Emit the five success lines, each write-then-notify awaited before the
    /// next begins, then hold the link up for the settle delay.
    async fn report_success(&mut self, ip: Ipv4Addr) -> Result<(), TransportError> {
        for line in success_report(ip, self.config) {
            self.link.send_status(&line).await?;
            debug!("status sent: {}", line.key());
        }
        sleep(REPORT_SETTLE_DELAY).await;
        Ok(())
    }

    async fn report_failure(&mut self) -> Result<(), TransportError> {
        self.link
            .send_status(&StatusLine::Error(BAD_NETWORK_REASON.to_string()))
            .await
    }

    fn enter(&mut self, next: DeviceState) {
        debug!("state {:?} -> {:?}", *self.state, next);
        *self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::JoinError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct LinkLog {
        sent: Vec<String>,
        disconnects: usize,
    }

    /// Scripted peer link: a queue of events plus a shared log the test can
    /// inspect after the session consumed the link.
    struct ScriptLink {
        events: VecDeque<SessionEvent>,
        log: Rc<RefCell<LinkLog>>,
        refuse_mtu: bool,
        fail_sends_after: Option<usize>,
        fail_disconnect: bool,
    }

    impl ScriptLink {
        fn new(events: Vec<SessionEvent>) -> (Self, Rc<RefCell<LinkLog>>) {
            let log = Rc::new(RefCell::new(LinkLog::default()));
            (
                Self {
                    events: events.into(),
                    log: log.clone(),
                    refuse_mtu: false,
                    fail_sends_after: None,
                    fail_disconnect: false,
                },
                log,
            )
        }
    }

    impl ProvisioningLink for ScriptLink {
        async fn exchange_mtu(&mut self, _mtu: u16) -> Result<(), TransportError> {
            if self.refuse_mtu {
                Err(TransportError::Mtu("peer refused".into()))
            } else {
                Ok(())
            }
        }

        async fn next_event(&mut self) -> SessionEvent {
            self.events.pop_front().unwrap_or(SessionEvent::Disconnected)
        }

        async fn send_status(&mut self, line: &StatusLine) -> Result<(), TransportError> {
            let mut log = self.log.borrow_mut();
            if self
                .fail_sends_after
                .is_some_and(|limit| log.sent.len() >= limit)
            {
                return Err(TransportError::PeerGone);
            }
            log.sent.push(line.to_wire());
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            self.log.borrow_mut().disconnects += 1;
            if self.fail_disconnect {
                Err(TransportError::Disconnect("connection already closed".into()))
            } else {
                Ok(())
            }
        }

        fn peer(&self) -> &str {
            "test-peer"
        }
    }

    struct FakeJoiner {
        outcomes: VecDeque<Result<Ipv4Addr, JoinError>>,
        joined: bool,
        attempts: Vec<Credentials>,
    }

    impl FakeJoiner {
        fn new(outcomes: Vec<Result<Ipv4Addr, JoinError>>) -> Self {
            Self {
                outcomes: outcomes.into(),
                joined: false,
                attempts: Vec::new(),
            }
        }
    }

    impl NetworkJoiner for FakeJoiner {
        async fn join(
            &mut self,
            credentials: &Credentials,
            _timeout: Duration,
        ) -> Result<Ipv4Addr, JoinError> {
            self.attempts.push(credentials.clone());
            let outcome = self.outcomes.pop_front().unwrap_or(Err(JoinError::Timeout));
            self.joined = outcome.is_ok();
            outcome
        }

        fn is_joined(&self) -> bool {
            self.joined
        }
    }

    #[derive(Default)]
    struct RecordingIndicator {
        session_active: bool,
        joined_history: Vec<bool>,
    }

    impl Indicator for RecordingIndicator {
        fn session_started(&mut self) {
            self.session_active = true;
        }

        fn session_ended(&mut self) {
            self.session_active = false;
        }

        fn set_joined(&mut self, joined: bool) {
            self.joined_history.push(joined);
        }
    }

    fn write(text: &str) -> SessionEvent {
        SessionEvent::CredentialWrite(text.as_bytes().to_vec())
    }

    fn address() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 42)
    }

    async fn run_session(
        link: ScriptLink,
        joiner: &mut FakeJoiner,
        indicator: &mut RecordingIndicator,
    ) -> (SessionOutcome, DeviceState) {
        let config = DeviceConfig::default();
        let mut state = DeviceState::AwaitingCredentials;
        let outcome =
            ProvisioningSession::new(link, joiner, indicator, &mut state, &config)
                .run()
                .await;
        (outcome, state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_cycle_reports_five_lines() {
        let (link, log) = ScriptLink::new(vec![write("HomeNet"), write("hunter2")]);
        let mut joiner = FakeJoiner::new(vec![Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, state) = run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(outcome, SessionOutcome::Provisioned);
        assert_eq!(state, DeviceState::Disconnecting);
        assert_eq!(
            log.borrow().sent,
            vec![
                "IP:192.168.1.42",
                "PORT:1883",
                "USER:Mariano_Sanchez",
                "PASSWORD:0001",
                "CLIENT_ID:TK-2025-MA00-0001",
            ]
        );
        assert_eq!(log.borrow().disconnects, 1);
        assert_eq!(joiner.attempts.len(), 1);
        assert_eq!(joiner.attempts[0].network_name, "HomeNet");
        assert_eq!(joiner.attempts[0].passphrase, "hunter2");
        assert_eq!(indicator.joined_history, vec![true]);
        assert!(!indicator.session_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_join_retries_on_same_link() {
        let (link, log) = ScriptLink::new(vec![
            write("HomeNet"),
            write("wrongpass"),
            write("HomeNet"),
            write("hunter2"),
        ]);
        let mut joiner = FakeJoiner::new(vec![Err(JoinError::Timeout), Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, _) = run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(outcome, SessionOutcome::Provisioned);
        let log = log.borrow();
        assert_eq!(log.sent[0], "Error:Datos de red incorrectos");
        assert_eq!(log.sent.len(), 6);
        assert_eq!(log.sent[1], "IP:192.168.1.42");
        // The device never dropped the link between the two attempts.
        assert_eq!(log.disconnects, 1);
        assert_eq!(joiner.attempts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_join_returns_to_awaiting_credentials() {
        let (link, log) = ScriptLink::new(vec![write("HomeNet"), write("wrongpass")]);
        let mut joiner = FakeJoiner::new(vec![Err(JoinError::Timeout)]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, _) = run_session(link, &mut joiner, &mut indicator).await;

        // Exactly one Error line, then the session was back in
        // AwaitingCredentials when the scripted peer went away.
        assert_eq!(outcome, SessionOutcome::Aborted);
        assert_eq!(log.borrow().sent, vec!["Error:Datos de red incorrectos"]);
        assert_eq!(log.borrow().disconnects, 1);
        assert_eq!(indicator.joined_history, vec![false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_loss_mid_credentials_skips_join() {
        let (link, log) = ScriptLink::new(vec![write("HomeNet")]);
        let mut joiner = FakeJoiner::new(vec![]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, state) = run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(outcome, SessionOutcome::Aborted);
        assert_eq!(state, DeviceState::Disconnecting);
        assert!(joiner.attempts.is_empty());
        assert!(log.borrow().sent.is_empty());
        assert_eq!(log.borrow().disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_writes_consumed_in_submission_order() {
        // Both writes are queued before the session reads anything; the
        // first must become the network name, the second the passphrase.
        let (link, _) = ScriptLink::new(vec![write("first"), write("second")]);
        let mut joiner = FakeJoiner::new(vec![Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(joiner.attempts[0].network_name, "first");
        assert_eq!(joiner.attempts[0].passphrase, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_failure_is_tolerated() {
        let (mut link, log) = ScriptLink::new(vec![write("HomeNet"), write("hunter2")]);
        link.fail_disconnect = true;
        let mut joiner = FakeJoiner::new(vec![Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, _) = run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(outcome, SessionOutcome::Provisioned);
        assert_eq!(log.borrow().disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mtu_refusal_is_nonfatal() {
        let (mut link, log) = ScriptLink::new(vec![write("HomeNet"), write("hunter2")]);
        link.refuse_mtu = true;
        let mut joiner = FakeJoiner::new(vec![Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, _) = run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(outcome, SessionOutcome::Provisioned);
        assert_eq!(log.borrow().sent.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_name_short_circuits_to_error() {
        let (link, log) = ScriptLink::new(vec![
            write("   "),
            write("hunter2"),
            write("HomeNet"),
            write("hunter2"),
        ]);
        let mut joiner = FakeJoiner::new(vec![Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, _) = run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(outcome, SessionOutcome::Provisioned);
        // The blank name never reached the joiner.
        assert_eq!(joiner.attempts.len(), 1);
        assert_eq!(joiner.attempts[0].network_name, "HomeNet");
        assert_eq!(log.borrow().sent[0], "Error:Datos de red incorrectos");
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_failure_falls_through_to_disconnect() {
        let (mut link, log) = ScriptLink::new(vec![write("HomeNet"), write("hunter2")]);
        link.fail_sends_after = Some(2);
        let mut joiner = FakeJoiner::new(vec![Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        let (outcome, state) = run_session(link, &mut joiner, &mut indicator).await;

        assert_eq!(outcome, SessionOutcome::Aborted);
        assert_eq!(state, DeviceState::Disconnecting);
        assert_eq!(log.borrow().sent.len(), 2);
        assert_eq!(log.borrow().disconnects, 1);
        // The network is joined, so the success indicator stays on.
        assert_eq!(indicator.joined_history, vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_runs_after_full_report() {
        let (link, _) = ScriptLink::new(vec![write("HomeNet"), write("hunter2")]);
        let mut joiner = FakeJoiner::new(vec![Ok(address())]);
        let mut indicator = RecordingIndicator::default();

        let started = tokio::time::Instant::now();
        run_session(link, &mut joiner, &mut indicator).await;

        assert!(started.elapsed() >= REPORT_SETTLE_DELAY);
    }
}
