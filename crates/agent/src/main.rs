//! FleetLink agent entry point: loads configuration, enrolls if no client
//! certificate is present yet, wires the durable queue, the command
//! registry, the fallback uploader, and the connection manager, then runs
//! until a shutdown signal arrives.

mod handlers;

use std::sync::Arc;

use fleetlink_common::storage::{SqlitePool, SqlitePoolConfig};
use fleetlink_core::{ProbeSet, QueuePort};
use fleetlink_infra::{FallbackUploader, SqliteQueue};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = fleetlink_infra::config::load()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let _log_guard = fleetlink_infra::init_logging(&config)?;
    info!(agent_id = %config.agent_id, server_url = %config.server_url, "starting fleetlink agent");

    if !config.client_cert_path().exists() {
        info!("no client certificate found; enrolling with the control plane");
        fleetlink_infra::enroll(&config).await?;
    }

    let pool = Arc::new(SqlitePool::new(&config.queue_db_path(), SqlitePoolConfig::default())?);
    let queue: Arc<dyn QueuePort> =
        Arc::new(SqliteQueue::new(pool, config.max_attempts, config.default_ttl)?);

    let server_public_key =
        FallbackUploader::load_public_key(config.sftp.server_public_key_path.as_deref())?;
    let fallback = Arc::new(FallbackUploader::new(
        Arc::clone(&queue),
        config.sftp.clone(),
        config.agent_id.clone(),
        server_public_key,
    ));

    // Probe adapters (WMI, SSH, SNMP, port scanner, DNS) and the self-update
    // mechanism are external collaborators outside this crate's scope
    // (spec §1); the agent runs with none wired until a deployment supplies
    // them through these same constructor slots.
    let registry = Arc::new(handlers::build_registry(Arc::clone(&queue), ProbeSet::empty(), None));

    let manager = fleetlink_infra::ConnectionManager::new(&config, queue, registry, fallback);
    manager.start();

    wait_for_shutdown_signal().await;

    info!("shutdown signal received; stopping connection manager");
    manager.stop().await;
    info!("fleetlink agent stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to await ctrl_c");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to await ctrl_c");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to await ctrl_c");
    }
}
