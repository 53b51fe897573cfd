//! Connection state: the single, authoritative `ConnectionState` enum.
//!
//! Per the redesign resolution (SPEC_FULL.md §OPEN QUESTIONS), one enum
//! lives here and is shared by the control-link client, the state machine,
//! and the connection manager. The transport layer never defines its own
//! state; it reports raw events and reads this one back.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// The six states the connection FSM can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    SftpFallback,
    Error,
}

impl_domain_status_conversions!(ConnectionState {
    Disconnected => "disconnected",
    Connecting => "connecting",
    Connected => "connected",
    Reconnecting => "reconnecting",
    SftpFallback => "sftp_fallback",
    Error => "error",
});

/// Events that drive transitions between [`ConnectionState`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEvent {
    Connect,
    Connected,
    ConnectionError,
    Disconnect,
    ConnectionLost,
    ReconnectSuccess,
    ReconnectTimeout,
    SftpComplete,
    SftpFailed,
}

impl_domain_status_conversions!(ConnectionEvent {
    Connect => "connect",
    Connected => "connected",
    ConnectionError => "connection_error",
    Disconnect => "disconnect",
    ConnectionLost => "connection_lost",
    ReconnectSuccess => "reconnect_success",
    ReconnectTimeout => "reconnect_timeout",
    SftpComplete => "sftp_complete",
    SftpFailed => "sftp_failed",
});

/// Returns the target state for `(state, event)`, or `None` if the pair is
/// not a permitted transition (the caller rejects it with a warning and
/// leaves the state unchanged).
#[must_use]
pub fn next_state(state: ConnectionState, event: ConnectionEvent) -> Option<ConnectionState> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (state, event) {
        (S::Disconnected, E::Connect) => Some(S::Connecting),
        (S::Connecting, E::Connected) => Some(S::Connected),
        (S::Connecting, E::ConnectionError) => Some(S::Reconnecting),
        (S::Connected, E::Disconnect) => Some(S::Disconnected),
        (S::Connected, E::ConnectionLost) => Some(S::Reconnecting),
        (S::Reconnecting, E::ReconnectSuccess) => Some(S::Connected),
        (S::Reconnecting, E::ReconnectTimeout) => Some(S::SftpFallback),
        (S::SftpFallback, E::SftpComplete) => Some(S::Reconnecting),
        (S::SftpFallback, E::SftpFailed) => Some(S::Error),
        (S::Error, E::Connect) => Some(S::Connecting),
        _ => None,
    }
}

/// One recorded transition, kept in a bounded ring buffer for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ConnectionState,
    pub event: ConnectionEvent,
    pub to: ConnectionState,
    pub at: DateTime<Utc>,
}

/// The FSM's full observable state: current state, the disconnect-duration
/// clock, and a bounded transition history.
#[derive(Debug, Clone)]
pub struct ConnectionStateData {
    pub state: ConnectionState,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub disconnected_since: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
    pub history: VecDeque<TransitionRecord>,
    history_capacity: usize,
}

impl ConnectionStateData {
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            state: ConnectionState::Disconnected,
            last_connected_at: None,
            disconnected_since: Some(now),
            last_state_change: now,
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
        }
    }

    /// Apply one event: looks up the permitted transition, updates the
    /// disconnect-duration clock, and records the transition in history.
    /// Returns `None` (leaving state unchanged) if the pair is not in the
    /// table.
    pub fn apply_event(
        &mut self,
        event: ConnectionEvent,
        now: DateTime<Utc>,
    ) -> Option<ConnectionState> {
        let from = self.state;
        let to = next_state(from, event)?;

        if to == ConnectionState::Connected {
            self.disconnected_since = None;
            self.last_connected_at = Some(now);
        } else if self.disconnected_since.is_none() {
            self.disconnected_since = Some(now);
        }

        self.state = to;
        self.last_state_change = now;
        self.push_history(TransitionRecord { from, event, to, at: now });
        Some(to)
    }

    fn push_history(&mut self, record: TransitionRecord) {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// The persisted connection-state watchdog contract: `connection_state.json`,
/// rewritten on every state change. Read by an external watchdog, not by
/// this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedConnectionState {
    pub last_connected: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
    pub is_connected: bool,
}

impl From<&ConnectionStateData> for PersistedConnectionState {
    fn from(data: &ConnectionStateData) -> Self {
        Self {
            last_connected: data.last_connected_at,
            last_state_change: data.last_state_change,
            is_connected: data.state == ConnectionState::Connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_transition_is_permitted() {
        use ConnectionEvent as E;
        use ConnectionState as S;
        let table = [
            (S::Disconnected, E::Connect, S::Connecting),
            (S::Connecting, E::Connected, S::Connected),
            (S::Connecting, E::ConnectionError, S::Reconnecting),
            (S::Connected, E::Disconnect, S::Disconnected),
            (S::Connected, E::ConnectionLost, S::Reconnecting),
            (S::Reconnecting, E::ReconnectSuccess, S::Connected),
            (S::Reconnecting, E::ReconnectTimeout, S::SftpFallback),
            (S::SftpFallback, E::SftpComplete, S::Reconnecting),
            (S::SftpFallback, E::SftpFailed, S::Error),
            (S::Error, E::Connect, S::Connecting),
        ];
        for (from, event, to) in table {
            assert_eq!(next_state(from, event), Some(to));
        }
    }

    #[test]
    fn undocumented_pairs_are_rejected() {
        assert_eq!(next_state(ConnectionState::Disconnected, ConnectionEvent::Connected), None);
        assert_eq!(next_state(ConnectionState::Connected, ConnectionEvent::Connect), None);
    }

    #[test]
    fn entering_connected_clears_disconnected_since() {
        let mut data = ConnectionStateData::new(8);
        let t0 = Utc::now();
        assert!(data.disconnected_since.is_some());

        data.apply_event(ConnectionEvent::Connect, t0);
        let t1 = t0 + chrono::Duration::seconds(5);
        data.apply_event(ConnectionEvent::Connected, t1);

        assert!(data.disconnected_since.is_none());
        assert_eq!(data.last_connected_at, Some(t1));
    }

    #[test]
    fn rejected_event_leaves_clock_and_state_untouched() {
        let mut data = ConnectionStateData::new(8);
        let before = data.state;
        let result = data.apply_event(ConnectionEvent::SftpComplete, Utc::now());
        assert_eq!(result, None);
        assert_eq!(data.state, before);
    }

    #[test]
    fn history_is_bounded_by_capacity() {
        let mut data = ConnectionStateData::new(2);
        let mut now = Utc::now();
        for _ in 0..3 {
            data.apply_event(ConnectionEvent::Connect, now);
            now += chrono::Duration::seconds(1);
            data.apply_event(ConnectionEvent::Connected, now);
            now += chrono::Duration::seconds(1);
            data.apply_event(ConnectionEvent::Disconnect, now);
            now += chrono::Duration::seconds(1);
        }
        assert_eq!(data.history.len(), 2);
    }
}
