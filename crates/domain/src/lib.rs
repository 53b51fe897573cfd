//! # FleetLink Domain
//!
//! Pure data types and models for the FleetLink delivery fabric: the
//! envelope, the connection FSM's state/event vocabulary, the reconnection
//! policy, the scheduled-job model, the wire frame types, and the agent's
//! configuration value.
//!
//! ## Architecture
//! - No dependencies on other FleetLink crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures; no I/O

pub mod config;
pub mod connection;
pub mod constants;
pub mod envelope;
pub mod errors;
pub mod macros;
pub mod reconnection;
pub mod scheduled_job;
pub mod wire;

pub use config::{AgentConfig, FallbackTrigger, SftpConfig};
pub use connection::{
    next_state, ConnectionEvent, ConnectionState, ConnectionStateData, PersistedConnectionState,
    TransitionRecord,
};
pub use envelope::{Envelope, EnvelopeKind, EnvelopeStatus, NewEnvelope, QueueStats};
pub use errors::{AgentError, AgentResult, ErrorClassification, ErrorKind};
pub use reconnection::{ReconnectionConfig, ReconnectionPolicy};
pub use scheduled_job::{default_jobs, ScheduledJob, SchedulerState};
pub use wire::{Command, CommandOutcome, EnrollRequest, EnrollResponse, Frame, HostMetrics, ResultStatus};
