//! Scheduled job: a cron-driven synthetic command injected by the local
//! scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the local scheduler's persisted job set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub cron_expression: String,
    pub action: String,
    pub params: Value,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub fail_count: u64,
    pub last_error: Option<String>,
}

impl ScheduledJob {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        action: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cron_expression: cron_expression.into(),
            action: action.into(),
            params,
            enabled: true,
            last_run: None,
            next_run: None,
            run_count: 0,
            fail_count: 0,
            last_error: None,
        }
    }

    /// Record a completed run, success or failure, and update `next_run`.
    pub fn record_run(&mut self, ran_at: DateTime<Utc>, error: Option<String>, next_run: Option<DateTime<Utc>>) {
        self.last_run = Some(ran_at);
        self.run_count += 1;
        if let Some(error) = error {
            self.fail_count += 1;
            self.last_error = Some(error);
        }
        self.next_run = next_run;
    }
}

/// The full job set, persisted as a single JSON document with atomic
/// replace. See `fleetlink-infra::scheduler` for the persistence layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    pub jobs: Vec<ScheduledJob>,
}

/// The default job set carried forward from the original implementation's
/// `DEFAULT_JOBS`: `scan-network` every 4 hours, `cleanup-queue` nightly at
/// 03:00, `check-updates` weekly on Sunday at 05:00.
#[must_use]
pub fn default_jobs() -> Vec<ScheduledJob> {
    vec![
        ScheduledJob::new(
            "scan-network",
            "Periodic network scan",
            "0 */4 * * *",
            "scan-network",
            Value::Object(serde_json::Map::new()),
        ),
        ScheduledJob::new(
            "cleanup-queue",
            "Nightly queue cleanup",
            "0 3 * * *",
            "cleanup-queue",
            Value::Object(serde_json::Map::new()),
        ),
        ScheduledJob::new(
            "check-updates",
            "Weekly update check",
            "0 5 * * 0",
            "check-updates",
            Value::Object(serde_json::Map::new()),
        ),
    ]
}
