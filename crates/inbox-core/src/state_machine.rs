use crate::{
    error::{ClientError, ClientErrorCategory},
    types::{PushConnectionState, PushStatus},
};

/// Push connection lifecycle.
///
/// `Idle -> Connecting -> Connected -> WaitingToReconnect -> Connecting ...`,
/// with `Stopped` reachable from every state on cancellation.
#[derive(Debug, Clone)]
pub struct PushStateMachine {
    state: PushConnectionState,
    attempts: u32,
}

impl Default for PushStateMachine {
    fn default() -> Self {
        Self {
            state: PushConnectionState::Idle,
            attempts: 0,
        }
    }
}

impl PushStateMachine {
    pub fn state(&self) -> PushConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Begin a connection attempt.
    pub fn on_connecting(&mut self) -> Result<PushStatus, ClientError> {
        self.transition_from_any_of(
            &[
                PushConnectionState::Idle,
                PushConnectionState::WaitingToReconnect,
            ],
            PushConnectionState::Connecting,
            "connect",
        )?;
        Ok(self.status(None))
    }

    pub fn on_connected(&mut self) -> Result<PushStatus, ClientError> {
        self.transition_from_any_of(
            &[PushConnectionState::Connecting],
            PushConnectionState::Connected,
            "connected",
        )?;
        self.attempts = 0;
        Ok(self.status(None))
    }

    /// Connection failed or dropped; schedule the next attempt after `retry_in_ms`.
    pub fn on_disconnected(&mut self, retry_in_ms: u64) -> Result<PushStatus, ClientError> {
        self.transition_from_any_of(
            &[
                PushConnectionState::Connecting,
                PushConnectionState::Connected,
            ],
            PushConnectionState::WaitingToReconnect,
            "disconnected",
        )?;
        self.attempts = self.attempts.saturating_add(1);
        Ok(self.status(Some(retry_in_ms)))
    }

    pub fn on_stopped(&mut self) -> PushStatus {
        self.state = PushConnectionState::Stopped;
        self.status(None)
    }

    fn status(&self, retry_in_ms: Option<u64>) -> PushStatus {
        PushStatus {
            state: self.state,
            retry_in_ms,
        }
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[PushConnectionState],
        next: PushConnectionState,
        action: &str,
    ) -> Result<(), ClientError> {
        if !expected.contains(&self.state) {
            return Err(ClientError::new(
                ClientErrorCategory::Internal,
                "invalid_state_transition",
                format!("cannot {action} from push state {:?}", self.state),
            ));
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_connect_drop_reconnect_cycle() {
        let mut sm = PushStateMachine::default();
        assert_eq!(sm.state(), PushConnectionState::Idle);

        sm.on_connecting().expect("connect from idle");
        sm.on_connected().expect("connected");
        let status = sm.on_disconnected(2_000).expect("drop");
        assert_eq!(status.state, PushConnectionState::WaitingToReconnect);
        assert_eq!(status.retry_in_ms, Some(2_000));
        assert_eq!(sm.attempts(), 1);

        sm.on_connecting().expect("reconnect");
        sm.on_disconnected(2_000).expect("connect failure");
        assert_eq!(sm.attempts(), 2);
        sm.on_connecting().expect("reconnect again");
        sm.on_connected().expect("connected");
        assert_eq!(sm.attempts(), 0);
    }

    #[test]
    fn rejects_connected_without_attempt() {
        let mut sm = PushStateMachine::default();
        let err = sm
            .on_connected()
            .expect_err("connected requires a pending attempt");
        assert_eq!(err.code, "invalid_state_transition");
    }

    #[test]
    fn stop_is_reachable_from_any_state() {
        let mut sm = PushStateMachine::default();
        sm.on_connecting().expect("connect");
        assert_eq!(sm.on_stopped().state, PushConnectionState::Stopped);
        assert!(sm.on_connecting().is_err());
    }
}
