//! Loads [`AgentConfig`] env-first, with TOML-file fallback for whatever
//! the environment leaves unset — the same two-phase strategy the desktop
//! client's config loader uses, adapted to the agent's flatter surface
//! (spec §6, AMBIENT STACK "Configuration").

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetlink_domain::config::ENV_PREFIX;
use fleetlink_domain::{AgentConfig, AgentError, AgentResult, FallbackTrigger, SftpConfig};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

/// Conventional TOML file locations checked in order when required
/// environment variables are missing. The first file found wins.
#[must_use]
pub fn probe_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("./agent.toml"), PathBuf::from("/etc/fleetlink/agent.toml")];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(".config/fleetlink/agent.toml"));
    }
    paths
}

/// Mirrors [`AgentConfig`]'s optional surface for TOML parsing; every field
/// is optional because the file only needs to cover what the environment
/// doesn't.
#[derive(Debug, Default, Deserialize)]
struct RawFileConfig {
    server_url: Option<String>,
    agent_id: Option<String>,
    agent_name: Option<String>,
    agent_token: Option<String>,
    data_dir: Option<PathBuf>,
    log_level: Option<String>,
    max_attempts: Option<u32>,
    default_ttl_hours: Option<i64>,
    cleanup_days: Option<i64>,
}

/// Load the agent's configuration: `.env` (development convenience), then
/// environment variables, then a conventional TOML file for whatever the
/// environment left unset. Fails if `server_url`, `agent_id`, or
/// `agent_token` are still unset after both phases.
#[instrument]
pub fn load() -> AgentResult<AgentConfig> {
    match dotenvy::dotenv() {
        Ok(path) => debug!(?path, "loaded .env"),
        Err(dotenvy::Error::Io(_)) => {}
        Err(e) => warn!(%e, "failed to parse .env, ignoring"),
    }

    let mut config = load_from_env();

    if config.server_url.is_empty() || config.agent_id.is_empty() || config.agent_token.is_empty()
    {
        if let Some(path) = probe_config_paths().into_iter().find(|p| p.exists()) {
            info!(?path, "filling incomplete environment configuration from file");
            config = load_from_file(&path, config)?;
        }
    }

    if config.server_url.is_empty() {
        return Err(AgentError::Config("server_url is not set".to_string()));
    }
    if config.agent_id.is_empty() {
        return Err(AgentError::Config("agent_id is not set".to_string()));
    }
    if config.agent_token.is_empty() {
        return Err(AgentError::Config("agent_token is not set".to_string()));
    }

    Ok(config)
}

/// Build a config from environment variables alone, layered over
/// [`AgentConfig::default`]. Never fails; missing required fields are left
/// empty for the caller to detect.
#[must_use]
pub fn load_from_env() -> AgentConfig {
    let default = AgentConfig::default();
    AgentConfig {
        server_url: env_var(&prefixed("SERVER_URL")).unwrap_or(default.server_url),
        agent_id: env_var(&prefixed("AGENT_ID")).unwrap_or(default.agent_id),
        agent_name: env_var(&prefixed("AGENT_NAME")).unwrap_or(default.agent_name),
        agent_token: env_var(&prefixed("AGENT_TOKEN")).unwrap_or(default.agent_token),
        data_dir: env_var(&prefixed("DATA_DIR")).map(PathBuf::from).unwrap_or(default.data_dir),
        log_level: env_var(&prefixed("LOG_LEVEL")).unwrap_or(default.log_level),
        sftp: SftpConfig::from_env(),
        fallback_trigger: FallbackTrigger::from_env(),
        max_attempts: default.max_attempts,
        default_ttl: default.default_ttl,
        cleanup_days: default.cleanup_days,
    }
}

/// Parse `path` as a TOML [`RawFileConfig`] and fill in whatever `base`
/// left at its default/empty value. Values already set from the
/// environment always win.
fn load_from_file(path: &Path, base: AgentConfig) -> AgentResult<AgentConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("reading {}: {e}", path.display())))?;
    let raw: RawFileConfig = toml::from_str(&text)
        .map_err(|e| AgentError::Config(format!("parsing {}: {e}", path.display())))?;

    let default = AgentConfig::default();
    Ok(AgentConfig {
        server_url: non_empty(base.server_url).or(raw.server_url).unwrap_or_default(),
        agent_id: non_empty(base.agent_id).or(raw.agent_id).unwrap_or_default(),
        agent_name: non_empty(base.agent_name).or(raw.agent_name).unwrap_or_default(),
        agent_token: non_empty(base.agent_token).or(raw.agent_token).unwrap_or_default(),
        data_dir: raw.data_dir.unwrap_or(base.data_dir),
        log_level: if base.log_level == default.log_level {
            raw.log_level.unwrap_or(base.log_level)
        } else {
            base.log_level
        },
        sftp: base.sftp,
        fallback_trigger: base.fallback_trigger,
        max_attempts: raw.max_attempts.unwrap_or(base.max_attempts),
        default_ttl: raw
            .default_ttl_hours
            .map(|h| Duration::from_secs((h * 3600).max(0) as u64))
            .unwrap_or(base.default_ttl),
        cleanup_days: raw.cleanup_days.unwrap_or(base.cleanup_days),
    })
}

fn prefixed(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use once_cell::sync::Lazy;

    use super::*;

    // Environment-variable tests must not run concurrently with each other.
    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn clear_env() {
        for key in [
            "DADUDE_SERVER_URL",
            "DADUDE_AGENT_ID",
            "DADUDE_AGENT_NAME",
            "DADUDE_AGENT_TOKEN",
            "DADUDE_DATA_DIR",
            "DADUDE_LOG_LEVEL",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn load_fails_when_required_fields_are_unset() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        clear_env();
        let result = load();
        assert!(result.is_err());
        clear_env();
    }

    #[test]
    fn load_from_env_picks_up_prefixed_variables() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        clear_env();
        std::env::set_var("DADUDE_SERVER_URL", "https://control.example.com");
        std::env::set_var("DADUDE_AGENT_ID", "agent-1");
        std::env::set_var("DADUDE_AGENT_TOKEN", "token-xyz");

        let config = load_from_env();
        assert_eq!(config.server_url, "https://control.example.com");
        assert_eq!(config.agent_id, "agent-1");
        assert_eq!(config.agent_token, "token-xyz");

        clear_env();
    }

    #[test]
    fn file_config_never_overrides_a_value_already_set_by_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "server_url = \"https://from-file.example.com\"\n").unwrap();

        let mut base = AgentConfig::default();
        base.server_url = "https://from-env.example.com".to_string();

        let merged = load_from_file(&path, base).unwrap();
        assert_eq!(merged.server_url, "https://from-env.example.com");
    }

    #[test]
    fn file_config_fills_values_env_left_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "server_url = \"https://from-file.example.com\"\n").unwrap();

        let mut base = AgentConfig::default();
        base.server_url = String::new();

        let merged = load_from_file(&path, base).unwrap();
        assert_eq!(merged.server_url, "https://from-file.example.com");
    }
}
