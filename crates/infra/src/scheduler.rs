//! The local scheduler (spec §4.7): cron-driven synthetic commands that
//! execute even while the control link is offline, queueing their results
//! through the same durable queue the control link drains.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleetlink_common::time::cron::CronSchedule;
use fleetlink_core::{result_envelope, HandlerRegistry, QueuePort};
use fleetlink_domain::{default_jobs, ScheduledJob, SchedulerState};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Fallback cadence applied to a job whose cron expression fails to parse
/// (spec §4.7: "If cron parsing is unavailable, fall back to a fixed 4-hour
/// interval").
fn fallback_interval() -> chrono::Duration {
    chrono::Duration::hours(fleetlink_domain::constants::SCHEDULER_FALLBACK_INTERVAL_HOURS)
}

/// Cron-driven job runner with atomic JSON persistence of its job set.
pub struct LocalScheduler {
    registry: Arc<HandlerRegistry>,
    queue: Arc<dyn QueuePort>,
    state_path: PathBuf,
    state: Mutex<SchedulerState>,
    tick_interval: std::time::Duration,
    cancellation: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LocalScheduler {
    /// Load persisted state from `state_path`, or seed it with
    /// [`default_jobs`] when absent or unreadable.
    #[instrument(skip(registry, queue))]
    pub fn new(registry: Arc<HandlerRegistry>, queue: Arc<dyn QueuePort>, state_path: PathBuf) -> Self {
        let mut state = load_state(&state_path).unwrap_or_else(|| {
            info!("no persisted scheduler state found; seeding default jobs");
            SchedulerState { jobs: default_jobs() }
        });

        let now = Utc::now();
        for job in &mut state.jobs {
            if job.next_run.is_none() {
                job.next_run = Some(next_run_after(job, now));
            }
        }

        Self {
            registry,
            queue,
            state_path,
            state: Mutex::new(state),
            tick_interval: fleetlink_domain::constants::SCHEDULER_TICK_INTERVAL,
            cancellation: CancellationToken::new(),
            task_handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task_handle.lock().is_some()
    }

    /// Spawn the 60-second tick loop.
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>) {
        if self.is_running() {
            warn!("scheduler already running");
            return;
        }

        let scheduler = Arc::clone(self);
        let cancel = self.cancellation.clone();
        let interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        scheduler.tick(Utc::now()).await;
                    }
                }
            }
        });

        *self.task_handle.lock() = Some(handle);
        info!("scheduler started");
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.cancellation.cancel();
        let handle = self.task_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler task panicked while stopping");
            }
        }
        info!("scheduler stopped");
    }

    /// Run every due job once, persisting the updated state afterward.
    async fn tick(&self, now: DateTime<Utc>) {
        let due: Vec<ScheduledJob> = {
            let state = self.state.lock();
            state
                .jobs
                .iter()
                .filter(|j| j.enabled && j.next_run.is_some_and(|next| next <= now))
                .cloned()
                .collect()
        };

        if due.is_empty() {
            return;
        }

        let mut changed = false;
        for job in due {
            self.run_job(&job, now).await;
            changed = true;
        }

        if changed {
            let snapshot = self.state.lock().clone();
            if let Err(e) = persist_state(&self.state_path, &snapshot) {
                error!(error = %e, "failed to persist scheduler state");
            }
        }
    }

    async fn run_job(&self, job: &ScheduledJob, now: DateTime<Utc>) {
        let command_id = format!("scheduled-{}-{}", job.id, now.timestamp());
        debug!(job_id = %job.id, command_id = %command_id, "running scheduled job");

        let (error, outcome) = match self.registry.dispatch(&job.action, job.params.clone()).await {
            Ok(outcome) => (None, outcome),
            Err(e) => (Some(e.to_string()), fleetlink_domain::CommandOutcome::error(e.to_string())),
        };

        let next_run = next_run_after(job, now);

        {
            let mut state = self.state.lock();
            if let Some(stored) = state.jobs.iter_mut().find(|j| j.id == job.id) {
                stored.record_run(now, error.clone(), Some(next_run));
            }
        }

        let payload = serde_json::json!({
            "scheduled": true,
            "job_id": job.id,
            "status": outcome.status,
            "data": outcome.data,
            "error": outcome.error,
        });

        if let Err(e) = self.queue.enqueue(result_envelope(command_id, payload)).await {
            error!(job_id = %job.id, error = %e, "failed to enqueue scheduled job result");
        }
    }
}

impl Drop for LocalScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("LocalScheduler dropped while running; cancelling background task");
            self.cancellation.cancel();
        }
    }
}

fn next_run_after(job: &ScheduledJob, now: DateTime<Utc>) -> DateTime<Utc> {
    CronSchedule::new(&job.cron_expression)
        .ok()
        .and_then(|schedule| schedule.next_after(&now))
        .unwrap_or_else(|| {
            warn!(job_id = %job.id, cron = %job.cron_expression, "cron parse failed; falling back to a fixed interval");
            now + fallback_interval()
        })
}

fn load_state(path: &Path) -> Option<SchedulerState> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "failed to parse persisted scheduler state; ignoring");
            None
        }
    }
}

/// Write `state` to `path` via a temp-file-then-rename so a crash mid-write
/// never leaves a truncated state file behind.
fn persist_state(path: &Path, state: &SchedulerState) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(state)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleetlink_core::QueueResult;
    use fleetlink_domain::{Envelope, NewEnvelope, QueueStats};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingQueue {
        enqueued: StdMutex<Vec<NewEnvelope>>,
    }

    #[async_trait]
    impl QueuePort for RecordingQueue {
        async fn enqueue(&self, envelope: NewEnvelope) -> QueueResult<i64> {
            self.enqueued.lock().unwrap_or_else(|p| p.into_inner()).push(envelope);
            Ok(1)
        }
        async fn dequeue(&self, _b: usize) -> QueueResult<Vec<Envelope>> {
            Ok(Vec::new())
        }
        async fn mark_sent(&self, _id: i64) -> QueueResult<()> {
            Ok(())
        }
        async fn mark_failed(&self, _id: i64, _e: &str) -> QueueResult<()> {
            Ok(())
        }
        async fn mark_expired(&self, _id: i64) -> QueueResult<()> {
            Ok(())
        }
        async fn get_all_pending(&self) -> QueueResult<Vec<Envelope>> {
            Ok(Vec::new())
        }
        async fn gc_expired(&self) -> QueueResult<()> {
            Ok(())
        }
        async fn reap_old(&self, _days: i64) -> QueueResult<usize> {
            Ok(0)
        }
        async fn stats(&self) -> QueueResult<QueueStats> {
            Ok(QueueStats::default())
        }
    }

    fn registry_with_ping() -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        registry.register("ping", Arc::new(|_params: serde_json::Value| async {
            fleetlink_domain::CommandOutcome::success(serde_json::json!({"pong": true}))
        }));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn due_job_runs_and_enqueues_a_result_with_scheduled_marker() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("scheduler_state.json");

        let queue = Arc::new(RecordingQueue::default());
        let registry = registry_with_ping();
        let scheduler = LocalScheduler::new(registry, queue.clone(), state_path.clone());

        let now = Utc::now();
        {
            let mut state = scheduler.state.lock();
            state.jobs = vec![fleetlink_domain::ScheduledJob {
                next_run: Some(now),
                ..fleetlink_domain::ScheduledJob::new("t1", "Test", "* * * * *", "ping", serde_json::Value::Null)
            }];
        }

        scheduler.tick(now).await;

        let enqueued = queue.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].payload["scheduled"], true);
        assert_eq!(enqueued[0].payload["job_id"], "t1");

        let persisted = std::fs::read_to_string(&state_path).unwrap();
        let persisted: SchedulerState = serde_json::from_str(&persisted).unwrap();
        assert_eq!(persisted.jobs[0].run_count, 1);
    }

    #[tokio::test]
    async fn unknown_action_records_a_failed_run_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("scheduler_state.json");
        let queue = Arc::new(RecordingQueue::default());
        let registry = Arc::new(HandlerRegistry::new());
        let scheduler = LocalScheduler::new(registry, queue.clone(), state_path);

        let now = Utc::now();
        {
            let mut state = scheduler.state.lock();
            state.jobs = vec![fleetlink_domain::ScheduledJob {
                next_run: Some(now),
                ..fleetlink_domain::ScheduledJob::new("t2", "Test", "* * * * *", "missing-action", serde_json::Value::Null)
            }];
        }

        scheduler.tick(now).await;

        let state = scheduler.state.lock();
        assert_eq!(state.jobs[0].fail_count, 1);
        assert!(queue.enqueued.lock().unwrap().len() == 1);
    }

    #[test]
    fn default_jobs_get_a_computed_next_run_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("scheduler_state.json");
        let queue = Arc::new(RecordingQueue::default());
        let registry = registry_with_ping();
        let scheduler = LocalScheduler::new(registry, queue, state_path);

        let state = scheduler.state.lock();
        assert!(state.jobs.iter().all(|j| j.next_run.is_some()));
    }
}
