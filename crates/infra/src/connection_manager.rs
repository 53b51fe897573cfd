//! The connection manager (spec §4.8): the supervisor that starts the
//! control link, the queue worker, and the scheduler; owns the FSM and is
//! the only thing permitted to call `handle_event` on it; and wires the
//! control link's callbacks and the FSM's fallback trigger to their
//! handlers.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use fleetlink_core::{
    CommandHandler, ConnectionFsm, ControlLinkPort, HandlerRegistry, QueuePort,
    SftpRequiredHandler, StateChangeHandler,
};
use fleetlink_domain::{
    AgentConfig, Command, CommandOutcome, ConnectionEvent, ConnectionState,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::control_link::{WsControlLink, WsControlLinkConfig};
use crate::queue_worker::{QueueWorker, QueueWorkerConfig};
use crate::scheduler::LocalScheduler;

/// Forwards the control link's synchronous callbacks and async command
/// dispatch into the manager without the manager holding a strong
/// self-reference. Built before the link (which requires its handlers at
/// construction time) and upgraded on every call.
struct ManagerHandle(Weak<ConnectionManager>);

#[async_trait]
impl CommandHandler for ManagerHandle {
    async fn handle(&self, command: Command) -> CommandOutcome {
        match self.0.upgrade() {
            Some(manager) => manager.dispatch_command(command).await,
            None => CommandOutcome::error("connection manager is shutting down"),
        }
    }
}

impl StateChangeHandler for ManagerHandle {
    fn on_connected(&self) {
        if let Some(manager) = self.0.upgrade() {
            manager.on_transport_connected();
        }
    }

    fn on_connection_lost(&self) {
        if let Some(manager) = self.0.upgrade() {
            manager.on_transport_connection_lost();
        }
    }
}

/// Supervisor owning the FSM and the three background components that
/// depend on its verdict: the control link, the queue worker, and the
/// scheduler (spec §4.8).
pub struct ConnectionManager {
    fsm: Mutex<ConnectionFsm>,
    registry: Arc<HandlerRegistry>,
    link: Arc<WsControlLink>,
    worker: QueueWorker,
    scheduler: Arc<LocalScheduler>,
    fallback: Arc<dyn SftpRequiredHandler>,
    connection_state_path: std::path::PathBuf,
    cancellation: CancellationToken,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Build every owned component and wire them together. Returns an
    /// `Arc` because the control link needs a weak handle back to the
    /// manager before the manager itself can finish constructing.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        queue: Arc<dyn QueuePort>,
        registry: Arc<HandlerRegistry>,
        fallback: Arc<dyn SftpRequiredHandler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<ConnectionManager>| {
            let handle = Arc::new(ManagerHandle(weak.clone()));
            let link_config = WsControlLinkConfig::from_agent_config(config);
            let link = Arc::new(WsControlLink::new(link_config, handle.clone(), handle));

            let worker =
                QueueWorker::new(Arc::clone(&queue), Arc::clone(&link), QueueWorkerConfig::default());

            let scheduler = Arc::new(LocalScheduler::new(
                Arc::clone(&registry),
                queue,
                config.scheduler_state_path(),
            ));

            let fsm = ConnectionFsm::new(
                fleetlink_domain::constants::FSM_HISTORY_CAPACITY,
                config.fallback_trigger.timeout(),
            );

            Self {
                fsm: Mutex::new(fsm),
                registry,
                link,
                worker,
                scheduler,
                fallback,
                connection_state_path: config.connection_state_path(),
                cancellation: CancellationToken::new(),
                monitor_handle: Mutex::new(None),
            }
        })
    }

    /// Start the control link, the queue worker, the scheduler, and the
    /// FSM's periodic monitor, in that order.
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>) {
        self.link.start();
        self.worker.start();
        self.scheduler.start();
        self.start_fsm_monitor();
        info!("connection manager started");
    }

    /// Stop every component in reverse startup order, giving the queue
    /// worker a bounded window to drain before the link is torn down
    /// (spec §4.8, §5 "Cancellation & timeouts").
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancellation.cancel();
        if let Some(handle) = self.monitor_handle.lock().take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "fsm monitor task panicked while stopping");
            }
        }

        self.scheduler.stop().await;

        if self.link.is_connected() {
            let drain = tokio::time::timeout(
                fleetlink_domain::constants::SHUTDOWN_DRAIN_WINDOW,
                self.worker.flush_all(),
            );
            if drain.await.is_err() {
                warn!("shutdown drain window elapsed before the queue fully drained");
            }
        }

        self.worker.stop().await;
        self.link.stop().await;
        info!("connection manager stopped");
    }

    #[must_use]
    pub fn fsm_state(&self) -> ConnectionState {
        self.fsm.lock().state()
    }

    async fn dispatch_command(&self, command: Command) -> CommandOutcome {
        match self.registry.dispatch(&command.action, command.params).await {
            Ok(outcome) => outcome,
            Err(e) => CommandOutcome::error(e.to_string()),
        }
    }

    /// The transport just finished its TLS/WebSocket handshake. Translate
    /// that into whichever FSM event is valid from the current state: a
    /// fresh connect from `disconnected`/`error`, or a recovery from
    /// `reconnecting`.
    fn on_transport_connected(&self) {
        let now = Utc::now();
        let mut fsm = self.fsm.lock();
        match fsm.state() {
            ConnectionState::Disconnected | ConnectionState::Error => {
                fsm.handle_event(ConnectionEvent::Connect, now);
                fsm.handle_event(ConnectionEvent::Connected, now);
            }
            ConnectionState::Reconnecting => {
                fsm.handle_event(ConnectionEvent::ReconnectSuccess, now);
            }
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::SftpFallback => {
                warn!(state = ?fsm.state(), "on_connected fired from an unexpected FSM state");
            }
        }
        drop(fsm);
        self.persist_connection_state();
    }

    /// The transport's session ended (connect failure or a dropped
    /// session). Translate into `connection_error` from `connecting` or
    /// `connection_lost` from `connected`.
    fn on_transport_connection_lost(&self) {
        let now = Utc::now();
        let mut fsm = self.fsm.lock();
        match fsm.state() {
            ConnectionState::Connecting => {
                fsm.handle_event(ConnectionEvent::ConnectionError, now);
            }
            ConnectionState::Connected => {
                fsm.handle_event(ConnectionEvent::ConnectionLost, now);
            }
            ConnectionState::Disconnected
            | ConnectionState::Reconnecting
            | ConnectionState::SftpFallback
            | ConnectionState::Error => {}
        }
        drop(fsm);
        self.persist_connection_state();
    }

    fn persist_connection_state(&self) {
        let persisted = self.fsm.lock().to_persisted();
        if let Err(e) = write_connection_state(&self.connection_state_path, &persisted) {
            error!(error = %e, "failed to persist connection state");
        }
    }

    /// Spawn the 60-second FSM tick loop that notices when the
    /// disconnect-duration clock has run past the fallback timeout and
    /// invokes the uploader (spec §4.4, §4.8).
    fn start_fsm_monitor(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let cancel = self.cancellation.clone();
        let interval = fleetlink_domain::constants::FSM_TICK_INTERVAL;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        manager.fsm_tick().await;
                    }
                }
            }
        });

        *self.monitor_handle.lock() = Some(handle);
    }

    async fn fsm_tick(&self) {
        let triggered = { self.fsm.lock().tick(Utc::now()) };
        self.persist_connection_state();

        if triggered.is_none() {
            return;
        }

        info!("sftp fallback triggered by disconnect timeout");
        let succeeded = self.fallback.upload_pending().await;
        let event =
            if succeeded { ConnectionEvent::SftpComplete } else { ConnectionEvent::SftpFailed };
        self.fsm.lock().handle_event(event, Utc::now());
        self.persist_connection_state();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.monitor_handle.lock().is_some() {
            warn!("ConnectionManager dropped while running; cancelling background tasks");
            self.cancellation.cancel();
        }
    }
}

fn write_connection_state(
    path: &std::path::Path,
    state: &fleetlink_domain::PersistedConnectionState,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(state)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)
}
