//! # FleetLink Core
//!
//! Pure business logic layer for the delivery fabric - no infrastructure
//! dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for the durable queue and the control link
//! - The connection state machine service
//! - The command-dispatch registry and the capability interfaces injected
//!   into it (probes, self-update, SFTP fallback)
//!
//! ## Architecture Principles
//! - Only depends on `fleetlink-common` and `fleetlink-domain`
//! - No SQLite, WebSocket, or SFTP code — those are `fleetlink-infra`
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod capabilities;
pub mod control_link;
pub mod fsm;
pub mod handler_registry;
pub mod probes;
pub mod queue;

pub use capabilities::{SelfUpdateHandler, SftpRequiredHandler};
pub use control_link::{CommandHandler, ControlLinkPort, LinkCounters, StateChangeHandler, TransportError, TransportResult};
pub use fsm::ConnectionFsm;
pub use handler_registry::{ActionHandler, HandlerRegistry, UnknownActionError};
pub use probes::{ProbeAdapter, ProbeSet, ProbeTarget};
pub use queue::{result_envelope, QueueError, QueuePort, QueueResult};
