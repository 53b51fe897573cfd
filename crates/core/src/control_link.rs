//! Control-link port (spec §4.3) and the capability interfaces injected
//! into it: command dispatch and connection-state observation.
//!
//! Per the redesign flags, callbacks are constructor-injected trait
//! objects, not globally registered hooks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetlink_domain::{Command, CommandOutcome, ConnectionState, Envelope};

/// Errors from the control-link transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("transport I/O error: {0}")]
    Io(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Observable counters exposed by the control-link client (spec §4.3,
/// "Observable state").
#[derive(Debug, Clone, Default)]
pub struct LinkCounters {
    pub sent: u64,
    pub received: u64,
    pub reconnects: u64,
    /// When the last heartbeat frame was written to the session, if any.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// The authenticated duplex session to the control plane.
#[async_trait]
pub trait ControlLinkPort: Send + Sync {
    /// Serialize and write `envelope` if connected; otherwise park it on
    /// the staging queue.
    async fn send(&self, envelope: &Envelope) -> TransportResult<()>;

    /// Current FSM-reported connection state.
    fn state(&self) -> ConnectionState;

    /// Shorthand for `state() == Connected`.
    fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected)
    }

    /// Counters since process start.
    fn counters(&self) -> LinkCounters;

    /// Number of envelopes currently parked on the staging queue.
    fn staging_queue_size(&self) -> usize;
}

/// Dispatches an inbound `command` frame and returns its outcome, which is
/// re-wrapped as a `result` envelope carrying the same id (spec §4.3,
/// "Inbound routing").
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> CommandOutcome;
}

/// Notified on every FSM transition the control link cares about
/// (`connected` and connection loss).
pub trait StateChangeHandler: Send + Sync {
    fn on_connected(&self) {}
    fn on_connection_lost(&self) {}
}
