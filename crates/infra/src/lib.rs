//! # FleetLink Infrastructure
//!
//! Implementations of the ports defined in `fleetlink-core`, plus the
//! pieces of the delivery fabric that are pure wiring rather than
//! business logic: configuration loading, the enrollment HTTP exchange,
//! and log setup.
//!
//! This crate contains:
//! - The SQLite-backed durable queue (`durable_queue`)
//! - The WebSocket/TLS control-link client (`control_link`)
//! - The SFTP fallback uploader (`fallback`)
//! - The queue worker's drain and GC loops (`queue_worker`)
//! - The cron-driven local scheduler (`scheduler`)
//! - The connection manager supervisor (`connection_manager`)
//! - The one-shot enrollment HTTP client (`enrollment`)
//! - Configuration loading (`config`) and log setup (`logging`)
//!
//! ## Architecture
//! - Implements traits defined in `fleetlink-core`
//! - Depends on `fleetlink-common`, `fleetlink-domain`, `fleetlink-core`
//! - Contains all "impure" code (I/O, network, filesystem)

pub mod config;
pub mod connection_manager;
pub mod control_link;
pub mod durable_queue;
pub mod enrollment;
pub mod fallback;
pub mod logging;
pub mod queue_worker;
pub mod scheduler;

pub use connection_manager::ConnectionManager;
pub use control_link::{WsControlLink, WsControlLinkConfig};
pub use durable_queue::SqliteQueue;
pub use enrollment::{enroll, EnrollmentError};
pub use fallback::{FallbackUploader, FallbackUploadError};
pub use logging::init as init_logging;
pub use queue_worker::{QueueWorker, QueueWorkerConfig};
pub use scheduler::LocalScheduler;
