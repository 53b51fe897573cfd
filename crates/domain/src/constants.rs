//! Application constants
//!
//! Centralized location for the delivery fabric's default tunables. Every
//! value here can be overridden by `AgentConfig`; these are the defaults used
//! when a setting is absent.

use std::time::Duration;

// Durable queue
pub const DEFAULT_MAX_ATTEMPTS: u32 = crate::envelope::DEFAULT_MAX_ATTEMPTS;
pub const DEFAULT_TTL_HOURS: i64 = crate::envelope::DEFAULT_TTL_HOURS;
pub const DEFAULT_CLEANUP_DAYS: i64 = crate::envelope::DEFAULT_CLEANUP_DAYS;

// Queue worker
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
pub const FLUSH_BATCH_SIZE: usize = 100;

// Control-link client
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// Reconnection policy
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;

// Connection state machine
pub const FSM_TICK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SFTP_FALLBACK_TIMEOUT_MINUTES: i64 = 30;
pub const FSM_HISTORY_CAPACITY: usize = 32;

// Local scheduler
pub const SCHEDULER_TICK_INTERVAL: Duration = Duration::from_secs(60);
pub const SCHEDULER_FALLBACK_INTERVAL_HOURS: i64 = 4;

// Connection manager
pub const SHUTDOWN_DRAIN_WINDOW: Duration = Duration::from_secs(10);

// Persisted state file names, relative to `data_dir`.
pub const QUEUE_DB_FILENAME: &str = "queue.db";
pub const SCHEDULER_STATE_FILENAME: &str = "scheduler_state.json";
pub const CONNECTION_STATE_FILENAME: &str = "connection_state.json";
pub const CERTS_DIRNAME: &str = "certs";
pub const LOGS_DIRNAME: &str = "logs";

pub const AGENT_CERT_FILENAME: &str = "agent.crt";
pub const AGENT_KEY_FILENAME: &str = "agent.key";
pub const CA_CERT_FILENAME: &str = "ca.crt";

// Logging
pub const LOG_FILENAME: &str = "agent.log";
pub const LOG_ROTATION_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_RETENTION_DAYS: i64 = 7;

// Enrollment
pub const ENROLL_PATH: &str = "/api/v1/agents/enroll";

// Fallback channel (SFTP)
pub const DEFAULT_SFTP_PORT: u16 = 22;
pub const DEFAULT_SFTP_REMOTE_PATH: &str = "/incoming";
pub const DEFAULT_SFTP_TIMEOUT: Duration = Duration::from_secs(30);
