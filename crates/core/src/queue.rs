//! The durable queue's port interface (spec §4.1).
//!
//! Implemented by `fleetlink-infra`'s SQLite-backed store; defined here so
//! the queue worker, the fallback uploader, and the scheduler can depend on
//! the contract without depending on SQLite.

use async_trait::async_trait;
use fleetlink_domain::{Envelope, EnvelopeKind, NewEnvelope, QueueStats};

/// Errors a queue implementation may surface.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("envelope {0} not found")]
    NotFound(i64),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Durable, at-least-once store of outbound envelopes.
#[async_trait]
pub trait QueuePort: Send + Sync {
    /// Insert a new envelope, returning its assigned id.
    async fn enqueue(&self, envelope: NewEnvelope) -> QueueResult<i64>;

    /// Atomically claim up to `batch_size` pending, non-expired envelopes
    /// under `max_attempts`, transitioning them to `sending`.
    async fn dequeue(&self, batch_size: usize) -> QueueResult<Vec<Envelope>>;

    /// Transition an envelope to `sent`.
    async fn mark_sent(&self, id: i64) -> QueueResult<()>;

    /// Transition an envelope back to `pending`, bumping `attempts` and
    /// recording `error`.
    async fn mark_failed(&self, id: i64, error: &str) -> QueueResult<()>;

    /// Transition an envelope to `expired`.
    async fn mark_expired(&self, id: i64) -> QueueResult<()>;

    /// Every envelope currently in `pending` or `sending` (used by the
    /// fallback uploader's dump).
    async fn get_all_pending(&self) -> QueueResult<Vec<Envelope>>;

    /// Sweep pending rows past their TTL or attempt cap.
    async fn gc_expired(&self) -> QueueResult<()>;

    /// Delete terminal rows older than `days`.
    async fn reap_old(&self, days: i64) -> QueueResult<usize>;

    /// Aggregate counts by status.
    async fn stats(&self) -> QueueResult<QueueStats>;
}

/// Convenience constructor used by producers (command handlers, the
/// scheduler, log/metric emitters) that don't need TTL control.
#[must_use]
pub fn result_envelope(task_id: impl Into<String>, payload: serde_json::Value) -> NewEnvelope {
    NewEnvelope::new(task_id, EnvelopeKind::Result, payload)
}
