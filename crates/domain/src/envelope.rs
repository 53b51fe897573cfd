//! The envelope: the unit of data moved by the delivery fabric.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::impl_domain_status_conversions;

/// Default cap on delivery attempts before an envelope is marked `failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default time-to-live applied to envelopes enqueued without an explicit TTL.
pub const DEFAULT_TTL_HOURS: i64 = 168;

/// Default retention window for terminal rows before they are reaped.
pub const DEFAULT_CLEANUP_DAYS: i64 = 30;

/// Selects the outbound frame an envelope is serialized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// A reply to a dispatched command.
    Result,
    /// A log line forwarded to the control plane.
    Log,
    /// A metrics sample forwarded to the control plane.
    Metric,
}

impl_domain_status_conversions!(EnvelopeKind {
    Result => "result",
    Log => "log",
    Metric => "metric",
});

/// Lifecycle state of a queued envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed by a worker, in flight.
    Sending,
    /// Delivered on some channel at least once. Terminal.
    Sent,
    /// Exhausted its retry budget. Terminal.
    Failed,
    /// Expired before delivery. Terminal.
    Expired,
}

impl EnvelopeStatus {
    /// Terminal statuses never re-enter transport.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Expired)
    }
}

impl_domain_status_conversions!(EnvelopeStatus {
    Pending => "pending",
    Sending => "sending",
    Sent => "sent",
    Failed => "failed",
    Expired => "expired",
});

/// One queued outbound message with its delivery metadata.
///
/// `id` is assigned by the durable queue on insert and is strictly
/// increasing; producers never set it themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: i64,
    pub task_id: String,
    pub kind: EnvelopeKind,
    pub payload: Value,
    pub status: EnvelopeStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Whether this envelope has passed its expiry deadline as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Whether this envelope has exhausted its attempt budget.
    #[must_use]
    pub fn attempts_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }
}

/// Parameters accepted by `enqueue`; everything else is stamped by the queue.
#[derive(Debug, Clone)]
pub struct NewEnvelope {
    pub task_id: String,
    pub kind: EnvelopeKind,
    pub payload: Value,
    pub ttl: Option<chrono::Duration>,
}

impl NewEnvelope {
    #[must_use]
    pub fn new(task_id: impl Into<String>, kind: EnvelopeKind, payload: Value) -> Self {
        Self { task_id: task_id.into(), kind, payload, ttl: None }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Aggregate counts returned by the durable queue's `stats` operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub sending: u64,
    pub sent: u64,
    pub failed: u64,
    pub expired: u64,
    pub total: u64,
    pub oldest_pending_created_at: Option<DateTime<Utc>>,
}
