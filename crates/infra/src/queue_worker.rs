//! The queue worker (spec §4.5): drains the durable queue to the control
//! link while connected, garbage-collects expired and old rows on its own
//! cadence, and offers a bulk `flush_all` for the supervisor to call right
//! after a reconnect.

use std::sync::Arc;
use std::time::Duration;

use fleetlink_core::{ControlLinkPort, QueuePort};
use fleetlink_domain::{constants, Envelope, EnvelopeKind, ReconnectionConfig};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Tunables for the drain and GC loops (spec §4.5 defaults).
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub send_delay: Duration,
    pub cleanup_interval: Duration,
    pub cleanup_days: i64,
    pub flush_batch_size: usize,
    pub backoff: ReconnectionConfig,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            poll_interval: constants::DEFAULT_POLL_INTERVAL,
            send_delay: constants::DEFAULT_SEND_DELAY,
            cleanup_interval: constants::DEFAULT_CLEANUP_INTERVAL,
            cleanup_days: constants::DEFAULT_CLEANUP_DAYS,
            flush_batch_size: constants::FLUSH_BATCH_SIZE,
            backoff: ReconnectionConfig::default(),
        }
    }
}

/// Drains the durable queue to the control link and reaps stale rows.
/// Owns two background tasks (drain, GC) with an independent start/stop
/// lifecycle each, cancelled together.
pub struct QueueWorker {
    queue: Arc<dyn QueuePort>,
    link: Arc<dyn ControlLinkPort>,
    config: QueueWorkerConfig,
    cancellation: CancellationToken,
    drain_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    gc_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl QueueWorker {
    #[must_use]
    pub fn new(queue: Arc<dyn QueuePort>, link: Arc<dyn ControlLinkPort>, config: QueueWorkerConfig) -> Self {
        Self {
            queue,
            link,
            config,
            cancellation: CancellationToken::new(),
            drain_handle: std::sync::Mutex::new(None),
            gc_handle: std::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.drain_handle.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    #[instrument(skip(self))]
    pub fn start(&self) {
        if self.is_running() {
            warn!("queue worker already running");
            return;
        }

        let cancel = self.cancellation.clone();
        let queue = Arc::clone(&self.queue);
        let link = Arc::clone(&self.link);
        let config = self.config.clone();
        let drain = tokio::spawn(async move {
            drain_loop(queue, link, config, cancel).await;
        });

        let cancel = self.cancellation.clone();
        let queue = Arc::clone(&self.queue);
        let cleanup_interval = self.config.cleanup_interval;
        let cleanup_days = self.config.cleanup_days;
        let gc = tokio::spawn(async move {
            gc_loop(queue, cleanup_interval, cleanup_days, cancel).await;
        });

        *self.drain_handle.lock().unwrap_or_else(|p| p.into_inner()) = Some(drain);
        *self.gc_handle.lock().unwrap_or_else(|p| p.into_inner()) = Some(gc);
        info!("queue worker started");
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancellation.cancel();
        let drain = self.drain_handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        let gc = self.gc_handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = drain {
            if let Err(e) = handle.await {
                warn!(error = %e, "drain loop task panicked while stopping");
            }
        }
        if let Some(handle) = gc {
            if let Err(e) = handle.await {
                warn!(error = %e, "gc loop task panicked while stopping");
            }
        }
        info!("queue worker stopped");
    }

    /// Drain the queue in `flush_batch_size` batches with no inter-item
    /// delay, until either it is empty or the link drops (spec §4.5,
    /// "Flush operation"). Intended to be called by the connection manager
    /// right after a reconnect.
    #[instrument(skip(self))]
    pub async fn flush_all(&self) {
        loop {
            if !self.link.is_connected() {
                debug!("flush_all stopping: link no longer connected");
                return;
            }

            let batch = match self.queue.dequeue(self.config.flush_batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "flush_all dequeue failed");
                    return;
                }
            };

            if batch.is_empty() {
                return;
            }

            for envelope in batch {
                if !self.link.is_connected() {
                    if let Err(e) = self.queue.mark_failed(envelope.id, "disconnected").await {
                        warn!(id = envelope.id, error = %e, "failed to return envelope to pending");
                    }
                    return;
                }
                send_one(&self.queue, &self.link, &envelope).await;
            }
        }
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("QueueWorker dropped while running; cancelling background tasks");
            self.cancellation.cancel();
        }
    }
}

async fn drain_loop(
    queue: Arc<dyn QueuePort>,
    link: Arc<dyn ControlLinkPort>,
    config: QueueWorkerConfig,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        if !link.is_connected() {
            if sleep_or_cancel(config.poll_interval, &cancel).await {
                break;
            }
            continue;
        }

        let batch = match queue.dequeue(config.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "drain loop dequeue failed");
                if sleep_or_cancel(config.poll_interval, &cancel).await {
                    break;
                }
                continue;
            }
        };

        if batch.is_empty() {
            if sleep_or_cancel(config.poll_interval, &cancel).await {
                break;
            }
            continue;
        }

        let mut consecutive_failures: u32 = 0;
        for envelope in batch {
            if !link.is_connected() {
                if let Err(e) = queue.mark_failed(envelope.id, "disconnected").await {
                    warn!(id = envelope.id, error = %e, "failed to return envelope to pending");
                }
                break;
            }

            if send_one(&queue, &link, &envelope).await {
                consecutive_failures = 0;
            } else {
                consecutive_failures = consecutive_failures.saturating_add(1);
            }

            if sleep_or_cancel(config.send_delay, &cancel).await {
                return;
            }
        }

        if consecutive_failures > 0 {
            let delay = batch_backoff_delay(&config.backoff, consecutive_failures);
            if sleep_or_cancel(delay, &cancel).await {
                break;
            }
        }
    }
}

/// `min(initial · multiplier^c, max) · (1 + U[0, 0.1])` (spec §4.5), where
/// `c` is the number of consecutive send failures within the batch just
/// processed. Independent of the control link's own reconnection backoff.
fn batch_backoff_delay(config: &ReconnectionConfig, consecutive_failures: u32) -> Duration {
    let base_ms = (config.initial_delay.as_millis() as f64)
        * config.multiplier.powi(consecutive_failures as i32);
    let capped_ms = base_ms.min(config.max_delay.as_millis() as f64);
    let jitter_ms = rand::thread_rng().gen_range(0.0..=(capped_ms * 0.1));
    Duration::from_millis((capped_ms + jitter_ms).round() as u64)
}

async fn gc_loop(queue: Arc<dyn QueuePort>, interval: Duration, cleanup_days: i64, cancel: CancellationToken) {
    loop {
        if sleep_or_cancel(interval, &cancel).await {
            break;
        }

        if let Err(e) = queue.gc_expired().await {
            error!(error = %e, "gc_expired failed");
        }
        match queue.reap_old(cleanup_days).await {
            Ok(count) if count > 0 => info!(count, "reaped terminal envelopes"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "reap_old failed"),
        }
    }
}

/// Sleep for `duration` unless cancelled first; returns `true` if
/// cancellation fired.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}

/// Send one envelope and mark it sent or failed accordingly. Unknown kinds
/// are sent as `result` (spec §4.5); `ControlLinkPort::send` already
/// performs that mapping, so this just records the outcome.
async fn send_one(queue: &Arc<dyn QueuePort>, link: &Arc<dyn ControlLinkPort>, envelope: &Envelope) -> bool {
    match link.send(envelope).await {
        Ok(()) => {
            if let Err(e) = queue.mark_sent(envelope.id).await {
                warn!(id = envelope.id, error = %e, "mark_sent failed");
            }
            true
        }
        Err(e) => {
            let kind = match envelope.kind {
                EnvelopeKind::Result => "result",
                EnvelopeKind::Log => "log",
                EnvelopeKind::Metric => "metric",
            };
            warn!(id = envelope.id, kind, error = %e, "failed to send envelope");
            if let Err(mark_err) = queue.mark_failed(envelope.id, &e.to_string()).await {
                warn!(id = envelope.id, error = %mark_err, "mark_failed failed");
            }
            false
        }
    }
}
