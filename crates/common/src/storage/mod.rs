//! Storage primitives for local SQLite-backed state.
//!
//! This module provides generic storage infrastructure: connection pooling,
//! pragma management, and the core storage traits shared by the durable
//! queue and scheduler persistence layers.

pub mod config;
pub mod error;
pub mod metrics;
pub mod sqlite;
pub mod types;

// Re-export commonly used types
pub use config::{StorageConfig, StorageConfigBuilder};
pub use error::{StorageError, StorageResult};
pub use metrics::StorageMetrics;
pub use sqlite::{apply_connection_pragmas, SqliteConnection, SqlitePool, SqlitePoolConfig};
pub use types::{Connection, ConnectionPool, HealthStatus, PoolMetrics, Statement, Transaction};
