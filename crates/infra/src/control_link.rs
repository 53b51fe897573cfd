//! The WebSocket/TLS control-link client (spec §4.3): the agent's half of
//! the primary transport to the control plane. Optionally mutually
//! authenticated with the certificate issued during enrollment; always
//! bearer-authenticated on the handshake request.
//!
//! Lifecycle mirrors the durable queue worker's: an explicit `start`/`stop`
//! pair around a cancellable background task, tracked with a
//! `CancellationToken` and a `JoinHandle`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleetlink_core::{
    CommandHandler, ControlLinkPort, LinkCounters, StateChangeHandler, TransportError,
    TransportResult,
};
use fleetlink_domain::{
    AgentConfig, Command, ConnectionState, Envelope, EnvelopeKind, Frame, HostMetrics,
    ReconnectionConfig, ReconnectionPolicy, ResultStatus,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use sysinfo::{Disks, System};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Constructor configuration, derived from [`AgentConfig`] plus the
/// constants spec §4.3 and §6 fix (heartbeat cadence, connect timeout).
#[derive(Debug, Clone)]
pub struct WsControlLinkConfig {
    pub server_url: String,
    pub agent_id: String,
    pub agent_token: String,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub ca_cert_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnection: ReconnectionConfig,
    pub staging_capacity: usize,
}

impl WsControlLinkConfig {
    /// Build from the agent's global configuration. `client_cert_path` and
    /// friends are populated only when the files enrollment wrote actually
    /// exist on disk; an agent that hasn't enrolled yet connects without a
    /// client certificate.
    #[must_use]
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        let cert = config.client_cert_path();
        let key = config.client_key_path();
        let ca = config.ca_cert_path();
        Self {
            server_url: config.server_url.clone(),
            agent_id: config.agent_id.clone(),
            agent_token: config.agent_token.clone(),
            client_cert_path: cert.exists().then_some(cert),
            client_key_path: key.exists().then_some(key),
            ca_cert_path: ca.exists().then_some(ca),
            connect_timeout: fleetlink_domain::constants::CONNECT_TIMEOUT,
            heartbeat_interval: fleetlink_domain::constants::HEARTBEAT_INTERVAL,
            reconnection: ReconnectionConfig::default(),
            staging_capacity: 1024,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum LinkRunError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("tls configuration error: {0}")]
    Tls(String),
    #[error("transport closed")]
    Closed,
    #[error("transport error: {0}")]
    Io(String),
}

/// The control-link client. `Arc`-shared between the connection manager and
/// whatever holds a `dyn ControlLinkPort` reference; internal mutability is
/// behind `parking_lot` locks and atomics so `send`/`state`/`counters` stay
/// synchronous per the port contract.
pub struct WsControlLink {
    config: WsControlLinkConfig,
    state: Arc<RwLock<ConnectionState>>,
    sent: Arc<AtomicU64>,
    received: Arc<AtomicU64>,
    reconnects: Arc<AtomicU64>,
    last_heartbeat: Arc<RwLock<Option<chrono::DateTime<Utc>>>>,
    staging: Arc<Mutex<VecDeque<Envelope>>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    command_handler: Arc<dyn CommandHandler>,
    state_change_handler: Arc<dyn StateChangeHandler>,
    cancellation: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WsControlLink {
    #[must_use]
    pub fn new(
        config: WsControlLinkConfig,
        command_handler: Arc<dyn CommandHandler>,
        state_change_handler: Arc<dyn StateChangeHandler>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            sent: Arc::new(AtomicU64::new(0)),
            received: Arc::new(AtomicU64::new(0)),
            reconnects: Arc::new(AtomicU64::new(0)),
            last_heartbeat: Arc::new(RwLock::new(None)),
            staging: Arc::new(Mutex::new(VecDeque::new())),
            outbound: Arc::new(Mutex::new(None)),
            command_handler,
            state_change_handler,
            cancellation: CancellationToken::new(),
            task_handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task_handle.lock().is_some()
    }

    /// Spawn the background connect/heartbeat/receive loop.
    #[instrument(skip(self))]
    pub fn start(&self) {
        if self.is_running() {
            warn!("control link already running");
            return;
        }

        let cancel = self.cancellation.clone();
        let state = Arc::clone(&self.state);
        let sent = Arc::clone(&self.sent);
        let received = Arc::clone(&self.received);
        let reconnects = Arc::clone(&self.reconnects);
        let last_heartbeat = Arc::clone(&self.last_heartbeat);
        let staging = Arc::clone(&self.staging);
        let outbound = Arc::clone(&self.outbound);
        let command_handler = Arc::clone(&self.command_handler);
        let state_change_handler = Arc::clone(&self.state_change_handler);
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            run_loop(
                config,
                state,
                sent,
                received,
                reconnects,
                last_heartbeat,
                staging,
                outbound,
                command_handler,
                state_change_handler,
                cancel,
            )
            .await;
        });

        *self.task_handle.lock() = Some(handle);
        info!("control link started");
    }

    /// Cancel the background task and wait for it to exit.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancellation.cancel();
        let handle = self.task_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "control link task panicked while stopping");
            }
        }
        *self.state.write() = ConnectionState::Disconnected;
        info!("control link stopped");
    }
}

#[async_trait]
impl ControlLinkPort for WsControlLink {
    async fn send(&self, envelope: &Envelope) -> TransportResult<()> {
        let frame = envelope_to_frame(envelope);
        let sender = self.outbound.lock().clone();
        match sender {
            Some(tx) if matches!(*self.state.read(), ConnectionState::Connected) => {
                tx.send(frame).map_err(|e| TransportError::Io(e.to_string()))?;
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            _ => {
                let mut staging = self.staging.lock();
                if staging.len() >= self.config.staging_capacity {
                    staging.pop_front();
                }
                staging.push_back(envelope.clone());
                Ok(())
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn counters(&self) -> LinkCounters {
        LinkCounters {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_heartbeat: *self.last_heartbeat.read(),
        }
    }

    fn staging_queue_size(&self) -> usize {
        self.staging.lock().len()
    }
}

impl Drop for WsControlLink {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("WsControlLink dropped while running; cancelling background task");
            self.cancellation.cancel();
        }
    }
}

fn envelope_to_frame(envelope: &Envelope) -> Frame {
    match envelope.kind {
        EnvelopeKind::Result => {
            let status = envelope
                .payload
                .get("status")
                .and_then(|v| serde_json::from_value::<ResultStatus>(v.clone()).ok())
                .unwrap_or(ResultStatus::Success);
            Frame::Result {
                id: envelope.task_id.clone(),
                task_id: envelope.task_id.clone(),
                status,
                data: Some(envelope.payload.clone()),
                error: None,
            }
        }
        EnvelopeKind::Log => Frame::Log {
            level: envelope
                .payload
                .get("level")
                .and_then(|v| v.as_str())
                .unwrap_or("info")
                .to_string(),
            message: envelope
                .payload
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            timestamp: envelope.created_at,
        },
        EnvelopeKind::Metric => Frame::Metrics {
            metrics: serde_json::from_value(envelope.payload.clone()).unwrap_or_default(),
            timestamp: envelope.created_at,
        },
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    config: WsControlLinkConfig,
    state: Arc<RwLock<ConnectionState>>,
    sent: Arc<AtomicU64>,
    received: Arc<AtomicU64>,
    reconnects: Arc<AtomicU64>,
    last_heartbeat: Arc<RwLock<Option<chrono::DateTime<Utc>>>>,
    staging: Arc<Mutex<VecDeque<Envelope>>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    command_handler: Arc<dyn CommandHandler>,
    state_change_handler: Arc<dyn StateChangeHandler>,
    cancel: CancellationToken,
) {
    let mut backoff = ReconnectionPolicy::new(config.reconnection.clone());

    loop {
        if cancel.is_cancelled() {
            break;
        }

        *state.write() = ConnectionState::Connecting;
        let connect_result = tokio::select! {
            () = cancel.cancelled() => break,
            result = tokio::time::timeout(config.connect_timeout, connect(&config)) => result,
        };

        let stream = match connect_result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "control link connect failed");
                *state.write() = ConnectionState::Reconnecting;
                reconnects.fetch_add(1, Ordering::Relaxed);
                wait_backoff(&mut backoff, &cancel).await;
                continue;
            }
            Err(_) => {
                warn!("control link connect timed out");
                *state.write() = ConnectionState::Reconnecting;
                reconnects.fetch_add(1, Ordering::Relaxed);
                wait_backoff(&mut backoff, &cancel).await;
                continue;
            }
        };

        backoff.reset();
        *state.write() = ConnectionState::Connected;
        state_change_handler.on_connected();
        info!("control link connected");

        let (tx, rx) = mpsc::unbounded_channel();
        *outbound.lock() = Some(tx.clone());
        drain_staging(&staging, &tx, &sent);

        session_loop(
            stream,
            &config,
            &sent,
            &received,
            &reconnects,
            &staging,
            &last_heartbeat,
            &command_handler,
            &tx,
            rx,
            &cancel,
        )
        .await;

        *outbound.lock() = None;
        *state.write() = ConnectionState::Reconnecting;
        state_change_handler.on_connection_lost();
        reconnects.fetch_add(1, Ordering::Relaxed);
        warn!("control link session ended; will reconnect");

        if cancel.is_cancelled() {
            break;
        }
        wait_backoff(&mut backoff, &cancel).await;
    }
}

async fn wait_backoff(backoff: &mut ReconnectionPolicy, cancel: &CancellationToken) {
    let delay = backoff.next_delay();
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {}
    }
}

fn drain_staging(
    staging: &Arc<Mutex<VecDeque<Envelope>>>,
    tx: &mpsc::UnboundedSender<Frame>,
    sent: &Arc<AtomicU64>,
) {
    let drained: Vec<Envelope> = {
        let mut guard = staging.lock();
        guard.drain(..).collect()
    };
    for envelope in drained {
        if tx.send(envelope_to_frame(&envelope)).is_ok() {
            sent.fetch_add(1, Ordering::Relaxed);
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(config: &WsControlLinkConfig) -> Result<WsStream, LinkRunError> {
    let mut request = config
        .server_url
        .clone()
        .into_client_request()
        .map_err(|e| LinkRunError::Connect(e.to_string()))?;

    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {}", config.agent_token))
            .map_err(|e| LinkRunError::Connect(e.to_string()))?,
    );
    headers.insert(
        "X-Agent-Version",
        HeaderValue::from_str(fleetlink_domain::constants::AGENT_VERSION)
            .map_err(|e| LinkRunError::Connect(e.to_string()))?,
    );

    let connector = build_connector(config).map_err(LinkRunError::Tls)?;

    let (stream, _response) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
            .await
            .map_err(|e| LinkRunError::Connect(e.to_string()))?;

    Ok(stream)
}

/// Build a TLS connector when the server URL scheme demands one and either
/// a custom CA or a client certificate is configured; returns `None` to let
/// `connect_async_tls_with_config` fall back to its native-roots default.
fn build_connector(config: &WsControlLinkConfig) -> Result<Option<Connector>, String> {
    if config.ca_cert_path.is_none() && config.client_cert_path.is_none() {
        return Ok(None);
    }

    let mut roots = rustls::RootCertStore::empty();
    if let Some(ca_path) = &config.ca_cert_path {
        for cert in load_certs(ca_path)? {
            roots.add(cert).map_err(|e| e.to_string())?;
        }
    } else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

    let tls_config = match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder.with_client_auth_cert(certs, key).map_err(|e| e.to_string())?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Some(Connector::Rustls(Arc::new(tls_config))))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("parsing {}: {e}", path.display()))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    rustls_pemfile::private_key(&mut bytes.as_slice())
        .map_err(|e| format!("parsing {}: {e}", path.display()))?
        .ok_or_else(|| format!("no private key found in {}", path.display()))
}

/// Runs the heartbeat and receive loops concurrently until either the
/// connection drops, a protocol error occurs, or cancellation fires.
#[allow(clippy::too_many_arguments)]
async fn session_loop(
    stream: WsStream,
    config: &WsControlLinkConfig,
    sent: &Arc<AtomicU64>,
    received: &Arc<AtomicU64>,
    reconnects: &Arc<AtomicU64>,
    staging: &Arc<Mutex<VecDeque<Envelope>>>,
    last_heartbeat: &Arc<RwLock<Option<chrono::DateTime<Utc>>>>,
    command_handler: &Arc<dyn CommandHandler>,
    tx: &mpsc::UnboundedSender<Frame>,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
    cancel: &CancellationToken,
) {
    let (mut write, mut read) = stream.split();
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately; consume it before the loop

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            _ = heartbeat.tick() => {
                let frame = Frame::Heartbeat {
                    agent_id: config.agent_id.clone(),
                    version: fleetlink_domain::constants::AGENT_VERSION.to_string(),
                    timestamp: Utc::now(),
                    metrics: gather_host_metrics(sent, received, reconnects, staging),
                };
                if let Err(e) = send_frame(&mut write, &frame).await {
                    warn!(error = %e, "failed to send heartbeat");
                    break;
                }
                *last_heartbeat.write() = Some(Utc::now());
            }

            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = send_frame(&mut write, &frame).await {
                            warn!(error = %e, "failed to send outbound frame");
                            break;
                        }
                    }
                    None => break,
                }
            }

            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        received.fetch_add(1, Ordering::Relaxed);
                        handle_inbound_text(text.as_str(), command_handler, tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("control link peer closed the session");
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary frames carry no application data
                    Some(Err(e)) => {
                        warn!(error = %e, "control link read error");
                        break;
                    }
                }
            }
        }
    }
}

async fn send_frame(
    write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    frame: &Frame,
) -> Result<(), LinkRunError> {
    let text = serde_json::to_string(frame).map_err(|e| LinkRunError::Io(e.to_string()))?;
    write.send(Message::Text(text.into())).await.map_err(|e| LinkRunError::Io(e.to_string()))
}

async fn handle_inbound_text(
    text: &str,
    command_handler: &Arc<dyn CommandHandler>,
    tx: &mpsc::UnboundedSender<Frame>,
) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "dropping unparseable inbound frame");
            return;
        }
    };

    match frame {
        Frame::Command { id, action, params } => {
            let command = Command { id: id.clone(), action, params };
            let outcome = command_handler.handle(command).await;
            let result = Frame::Result {
                id: id.clone(),
                task_id: id,
                status: outcome.status,
                data: outcome.data,
                error: outcome.error,
            };
            if tx.send(result).is_err() {
                warn!("outbound channel closed while replying to command");
            }
        }
        Frame::Ack { id } => debug!(id, "received ack"),
        Frame::ConfigUpdate { params } => info!(?params, "received config update"),
        other => warn!(frame_type = other.type_name(), "dropping unexpected inbound frame"),
    }
}

fn gather_host_metrics(
    sent: &Arc<AtomicU64>,
    received: &Arc<AtomicU64>,
    reconnects: &Arc<AtomicU64>,
    staging: &Arc<Mutex<VecDeque<Envelope>>>,
) -> HostMetrics {
    let mut system = System::new_all();
    system.refresh_all();
    let disks = Disks::new_with_refreshed_list();

    let memory_used_mb = system.used_memory() / (1024 * 1024);
    let memory_percent = if system.total_memory() > 0 {
        (system.used_memory() as f32 / system.total_memory() as f32) * 100.0
    } else {
        0.0
    };
    let cpu_percent = if system.cpus().is_empty() {
        0.0
    } else {
        system.cpus().iter().map(sysinfo::Cpu::cpu_usage).sum::<f32>() / system.cpus().len() as f32
    };

    let (disk_free_gb, disk_percent) = disks
        .iter()
        .max_by_key(|d| d.total_space())
        .map(|d| {
            let free_gb = d.available_space() / (1024 * 1024 * 1024);
            let used_percent = if d.total_space() > 0 {
                ((d.total_space() - d.available_space()) as f32 / d.total_space() as f32) * 100.0
            } else {
                0.0
            };
            (free_gb, used_percent)
        })
        .unwrap_or((0, 0.0));

    HostMetrics {
        cpu_percent,
        memory_percent,
        memory_used_mb,
        disk_percent,
        disk_free_gb,
        messages_sent: sent.load(Ordering::Relaxed),
        messages_received: received.load(Ordering::Relaxed),
        reconnect_count: reconnects.load(Ordering::Relaxed),
        pending_queue_size: staging.lock().len() as u64,
    }
}
