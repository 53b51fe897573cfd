//! `AgentConfig`: the single configuration value constructed once at
//! startup and passed by reference to every component (replaces the
//! original's global settings object, per the redesign flags).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Environment variable prefix for primary settings (spec §6).
pub const ENV_PREFIX: &str = "DADUDE_";

/// Fallback file-transfer (SFTP) channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub remote_path: String,
    pub server_public_key_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: constants::DEFAULT_SFTP_PORT,
            username: String::new(),
            password: None,
            private_key_path: None,
            remote_path: constants::DEFAULT_SFTP_REMOTE_PATH.to_string(),
            server_public_key_path: None,
            timeout: constants::DEFAULT_SFTP_TIMEOUT,
        }
    }
}

impl SftpConfig {
    /// Load from the `SFTP_*` environment variables (spec §6).
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            enabled: env_bool("SFTP_ENABLED", default.enabled),
            host: std::env::var("SFTP_HOST").unwrap_or(default.host),
            port: env_u16("SFTP_PORT", default.port),
            username: std::env::var("SFTP_USERNAME").unwrap_or(default.username),
            password: std::env::var("SFTP_PASSWORD").ok(),
            private_key_path: std::env::var("SFTP_PRIVATE_KEY_PATH").ok().map(PathBuf::from),
            remote_path: std::env::var("SFTP_REMOTE_PATH").unwrap_or(default.remote_path),
            server_public_key_path: std::env::var("SFTP_SERVER_PUBLIC_KEY_PATH")
                .ok()
                .map(PathBuf::from),
            timeout: Duration::from_secs(env_u64("SFTP_TIMEOUT", default.timeout.as_secs())),
        }
    }
}

/// The disconnect-duration threshold that triggers the SFTP fallback path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FallbackTrigger {
    pub timeout_minutes: i64,
}

impl Default for FallbackTrigger {
    fn default() -> Self {
        Self { timeout_minutes: constants::DEFAULT_SFTP_FALLBACK_TIMEOUT_MINUTES }
    }
}

impl FallbackTrigger {
    /// Load from `SFTP_FALLBACK_TIMEOUT_MINUTES` (spec §6).
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            timeout_minutes: std::env::var("SFTP_FALLBACK_TIMEOUT_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.timeout_minutes),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.timeout_minutes)
    }
}

/// The agent's full, immutable configuration. Constructed once at startup
/// and shared by `Arc` reference with every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub server_url: String,
    pub agent_id: String,
    pub agent_name: String,
    pub agent_token: String,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub sftp: SftpConfig,
    pub fallback_trigger: FallbackTrigger,
    pub max_attempts: u32,
    pub default_ttl: Duration,
    pub cleanup_days: i64,
}

impl AgentConfig {
    #[must_use]
    pub fn queue_db_path(&self) -> PathBuf {
        self.data_dir.join(constants::QUEUE_DB_FILENAME)
    }

    #[must_use]
    pub fn scheduler_state_path(&self) -> PathBuf {
        self.data_dir.join(constants::SCHEDULER_STATE_FILENAME)
    }

    #[must_use]
    pub fn connection_state_path(&self) -> PathBuf {
        self.data_dir.join(constants::CONNECTION_STATE_FILENAME)
    }

    #[must_use]
    pub fn certs_dir(&self) -> PathBuf {
        self.data_dir.join(constants::CERTS_DIRNAME)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(constants::LOGS_DIRNAME)
    }

    #[must_use]
    pub fn client_cert_path(&self) -> PathBuf {
        self.certs_dir().join(constants::AGENT_CERT_FILENAME)
    }

    #[must_use]
    pub fn client_key_path(&self) -> PathBuf {
        self.certs_dir().join(constants::AGENT_KEY_FILENAME)
    }

    #[must_use]
    pub fn ca_cert_path(&self) -> PathBuf {
        self.certs_dir().join(constants::CA_CERT_FILENAME)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            agent_id: String::new(),
            agent_name: String::new(),
            agent_token: String::new(),
            data_dir: PathBuf::from("/var/lib/dadude-agent"),
            log_level: "info".to_string(),
            sftp: SftpConfig::default(),
            fallback_trigger: FallbackTrigger::default(),
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            default_ttl: Duration::from_secs((constants::DEFAULT_TTL_HOURS * 3600) as u64),
            cleanup_days: constants::DEFAULT_CLEANUP_DAYS,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v.eq_ignore_ascii_case("true") || v == "1").unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
