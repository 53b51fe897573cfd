//! The connection state machine service (spec §4.4): wraps
//! `fleetlink_domain::connection`'s pure transition table with the
//! disconnect-duration clock and the periodic tick that triggers SFTP
//! fallback. Owned exclusively by the connection manager; all transitions
//! go through `handle_event` (spec §5, "Shared-resource policy").

use chrono::{DateTime, Utc};
use fleetlink_domain::{
    ConnectionEvent, ConnectionState, ConnectionStateData, PersistedConnectionState,
};
use tracing::{debug, warn};

/// Thread-owning wrapper around the FSM's pure state. Not `Sync` by
/// itself; callers serialize access (the connection manager holds it
/// behind a mutex).
pub struct ConnectionFsm {
    data: ConnectionStateData,
    sftp_timeout: chrono::Duration,
}

impl ConnectionFsm {
    #[must_use]
    pub fn new(history_capacity: usize, sftp_timeout: chrono::Duration) -> Self {
        Self { data: ConnectionStateData::new(history_capacity), sftp_timeout }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.data.state
    }

    #[must_use]
    pub fn disconnected_since(&self) -> Option<DateTime<Utc>> {
        self.data.disconnected_since
    }

    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        self.data.last_connected_at
    }

    /// Apply one event. Returns the resulting state, which is unchanged if
    /// the transition is not in the table (spec §4.4: "all other pairs are
    /// rejected with a warning").
    #[tracing::instrument(skip(self), fields(from = ?self.data.state, event = ?event))]
    pub fn handle_event(&mut self, event: ConnectionEvent, now: DateTime<Utc>) -> ConnectionState {
        let from = self.data.state;
        match self.data.apply_event(event, now) {
            Some(to) => {
                debug!(?from, ?event, ?to, "connection state transition");
                to
            }
            None => {
                warn!(?from, ?event, "rejected connection state transition");
                from
            }
        }
    }

    /// Periodic tick (spec §4.4: every 60 s). Returns `Some(Reconnecting)`
    /// if fallback was just triggered, so the caller can invoke the
    /// fallback handler.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<ConnectionEvent> {
        if self.data.state != ConnectionState::Reconnecting {
            return None;
        }
        let since = self.data.disconnected_since?;
        if now - since > self.sftp_timeout {
            self.handle_event(ConnectionEvent::ReconnectTimeout, now);
            return Some(ConnectionEvent::ReconnectTimeout);
        }
        None
    }

    #[must_use]
    pub fn to_persisted(&self) -> PersistedConnectionState {
        PersistedConnectionState::from(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fsm() -> ConnectionFsm {
        ConnectionFsm::new(32, chrono::Duration::minutes(30))
    }

    #[test]
    fn connect_then_connected_reaches_connected() {
        let mut fsm = fsm();
        let now = Utc::now();
        assert_eq!(fsm.handle_event(ConnectionEvent::Connect, now), ConnectionState::Connecting);
        assert_eq!(fsm.handle_event(ConnectionEvent::Connected, now), ConnectionState::Connected);
        assert!(fsm.disconnected_since().is_none());
        assert!(fsm.last_connected_at().is_some());
    }

    #[test]
    fn rejected_transition_leaves_state_unchanged() {
        let mut fsm = fsm();
        let now = Utc::now();
        let before = fsm.state();
        let after = fsm.handle_event(ConnectionEvent::SftpComplete, now);
        assert_eq!(before, after);
        assert_eq!(fsm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn tick_triggers_fallback_after_timeout_elapses() {
        let mut fsm = fsm();
        let start = Utc::now();
        fsm.handle_event(ConnectionEvent::Connect, start);
        fsm.handle_event(ConnectionEvent::ConnectionError, start);
        assert_eq!(fsm.state(), ConnectionState::Reconnecting);

        let too_soon = start + chrono::Duration::minutes(10);
        assert_eq!(fsm.tick(too_soon), None);
        assert_eq!(fsm.state(), ConnectionState::Reconnecting);

        let past_timeout = start + chrono::Duration::minutes(31);
        assert_eq!(fsm.tick(past_timeout), Some(ConnectionEvent::ReconnectTimeout));
        assert_eq!(fsm.state(), ConnectionState::SftpFallback);
    }
}
