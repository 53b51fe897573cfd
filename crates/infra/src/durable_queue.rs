//! SQLite-backed [`QueuePort`] (spec §4.1): a single-table durable store
//! with the critical atomic dequeue-and-mark-`sending` transaction.
//! Modeled on the desktop client's `SqlCipherOutboxRepository` — raw SQL
//! constants, `spawn_blocking` around every call, explicit row mappers,
//! timestamps stored as Unix-epoch seconds — minus the at-rest encryption,
//! which this store doesn't need.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use fleetlink_common::storage::sqlite::{SqliteConnection, SqlitePool};
use fleetlink_core::queue::{QueueError, QueuePort, QueueResult};
use fleetlink_domain::{Envelope, EnvelopeKind, EnvelopeStatus, NewEnvelope, QueueStats};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument, warn};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS envelopes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id     TEXT NOT NULL,
    kind        TEXT NOT NULL,
    payload     TEXT NOT NULL,
    status      TEXT NOT NULL,
    attempts    INTEGER NOT NULL DEFAULT 0,
    last_error  TEXT,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    expires_at  INTEGER
)";

const CREATE_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_envelopes_status ON envelopes(status)";
const CREATE_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_envelopes_created_at ON envelopes(created_at)";

const INSERT_ENVELOPE: &str = "
INSERT INTO envelopes (task_id, kind, payload, status, attempts, created_at, updated_at, expires_at)
VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4, ?5)";

const SELECT_DEQUEUE_CANDIDATES: &str = "
SELECT id FROM envelopes
WHERE status = 'pending' AND attempts < ?1 AND (expires_at IS NULL OR expires_at > ?2)
ORDER BY created_at ASC, id ASC
LIMIT ?3";

const MARK_SENDING: &str = "UPDATE envelopes SET status = 'sending', updated_at = ?2 WHERE id = ?1";
const SELECT_BY_ID: &str = "SELECT * FROM envelopes WHERE id = ?1";
const MARK_SENT: &str = "UPDATE envelopes SET status = 'sent', updated_at = ?2 WHERE id = ?1";
const MARK_FAILED: &str = "
UPDATE envelopes
SET status = 'pending', attempts = attempts + 1, last_error = ?2, updated_at = ?3
WHERE id = ?1";
const MARK_EXPIRED: &str = "UPDATE envelopes SET status = 'expired', updated_at = ?2 WHERE id = ?1";
const SELECT_PENDING_LIKE: &str =
    "SELECT * FROM envelopes WHERE status IN ('pending', 'sending') ORDER BY created_at ASC, id ASC";

const GC_EXPIRE: &str = "
UPDATE envelopes SET status = 'expired', updated_at = ?2
WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?1";
const GC_FAIL_EXHAUSTED: &str = "
UPDATE envelopes
SET status = 'failed', last_error = 'max attempts exceeded', updated_at = ?2
WHERE status = 'pending' AND attempts >= ?3";

const REAP_OLD: &str = "
DELETE FROM envelopes
WHERE status IN ('sent', 'failed', 'expired') AND updated_at < ?1";

const SELECT_STATS: &str = "SELECT status, COUNT(*) FROM envelopes GROUP BY status";
const SELECT_OLDEST_PENDING: &str =
    "SELECT MIN(created_at) FROM envelopes WHERE status = 'pending'";

/// SQLite-backed durable queue. `max_attempts` and `default_ttl` are fixed
/// at construction (loaded from [`fleetlink_domain::AgentConfig`]) and
/// applied to every `enqueue`/`dequeue` call.
pub struct SqliteQueue {
    pool: Arc<SqlitePool>,
    max_attempts: u32,
    default_ttl: Duration,
}

impl SqliteQueue {
    /// Open (creating if absent) the queue database at `pool`'s path and
    /// ensure the schema and indexes exist.
    #[instrument(skip(pool))]
    pub fn new(
        pool: Arc<SqlitePool>,
        max_attempts: u32,
        default_ttl: Duration,
    ) -> QueueResult<Self> {
        let conn = pool.get_sqlite_connection().map_err(|e| QueueError::Backend(e.to_string()))?;
        conn.execute_batch(CREATE_TABLE).map_err(|e| QueueError::Backend(e.to_string()))?;
        conn.execute(CREATE_STATUS_INDEX, &[]).map_err(|e| QueueError::Backend(e.to_string()))?;
        conn.execute(CREATE_CREATED_AT_INDEX, &[])
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Self { pool, max_attempts, default_ttl })
    }
}

fn epoch(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_epoch(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

fn row_to_envelope(row: &Row<'_>) -> rusqlite::Result<Envelope> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    let payload: String = row.get("payload")?;
    let expires_at: Option<i64> = row.get("expires_at")?;
    Ok(Envelope {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        kind: kind.parse().unwrap_or(EnvelopeKind::Result),
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        status: status.parse().unwrap_or(EnvelopeStatus::Pending),
        attempts: row.get::<_, i64>("attempts")? as u32,
        last_error: row.get("last_error")?,
        created_at: from_epoch(row.get("created_at")?),
        updated_at: from_epoch(row.get("updated_at")?),
        expires_at: expires_at.map(from_epoch),
    })
}

#[async_trait::async_trait]
impl QueuePort for SqliteQueue {
    #[instrument(skip(self, envelope), fields(task_id = %envelope.task_id, kind = ?envelope.kind))]
    async fn enqueue(&self, envelope: NewEnvelope) -> QueueResult<i64> {
        let pool = Arc::clone(&self.pool);
        let default_ttl = self.default_ttl;
        tokio::task::spawn_blocking(move || {
            let conn =
                pool.get_sqlite_connection().map_err(|e| QueueError::Backend(e.to_string()))?;
            let now = Utc::now();
            let ttl = envelope.ttl.unwrap_or_else(|| {
                chrono::Duration::from_std(default_ttl).unwrap_or(chrono::Duration::hours(168))
            });
            let expires_at = now + ttl;
            let payload = serde_json::to_string(&envelope.payload)
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            conn.execute(
                INSERT_ENVELOPE,
                params![
                    envelope.task_id,
                    envelope.kind.to_string(),
                    payload,
                    epoch(now),
                    epoch(expires_at)
                ],
            )
            .map_err(|e| QueueError::Backend(e.to_string()))?;
            Ok(conn.inner().last_insert_rowid())
        })
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn dequeue(&self, batch_size: usize) -> QueueResult<Vec<Envelope>> {
        let pool = Arc::clone(&self.pool);
        let max_attempts = self.max_attempts;
        tokio::task::spawn_blocking(move || {
            let mut conn =
                pool.get_sqlite_connection().map_err(|e| QueueError::Backend(e.to_string()))?;
            let now = epoch(Utc::now());

            // Atomic dequeue-and-mark-sending: the critical section (spec §5).
            let tx = rusqlite::Connection::transaction(&mut conn)
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            let ids: Vec<i64> = {
                let mut stmt = tx
                    .prepare(SELECT_DEQUEUE_CANDIDATES)
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                let rows = stmt
                    .query_map(params![max_attempts, now, batch_size as i64], |row| row.get(0))
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                rows.collect::<Result<Vec<_>, _>>().map_err(|e| QueueError::Backend(e.to_string()))?
            };

            let mut claimed = Vec::with_capacity(ids.len());
            for id in &ids {
                tx.execute(MARK_SENDING, params![id, now])
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                let envelope = tx
                    .query_row(SELECT_BY_ID, params![id], row_to_envelope)
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                claimed.push(envelope);
            }
            tx.commit().map_err(|e| QueueError::Backend(e.to_string()))?;

            debug!(claimed = claimed.len(), "dequeued batch");
            Ok(claimed)
        })
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?
    }

    #[instrument(skip(self))]
    async fn mark_sent(&self, id: i64) -> QueueResult<()> {
        with_connection(&self.pool, move |conn| {
            let affected = conn
                .execute(MARK_SENT, params![id, epoch(Utc::now())])
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            if affected == 0 {
                return Err(QueueError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, error), fields(error = %error))]
    async fn mark_failed(&self, id: i64, error: &str) -> QueueResult<()> {
        let error = error.to_string();
        with_connection(&self.pool, move |conn| {
            let affected = conn
                .execute(MARK_FAILED, params![id, error, epoch(Utc::now())])
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            if affected == 0 {
                return Err(QueueError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn mark_expired(&self, id: i64) -> QueueResult<()> {
        with_connection(&self.pool, move |conn| {
            let affected = conn
                .execute(MARK_EXPIRED, params![id, epoch(Utc::now())])
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            if affected == 0 {
                return Err(QueueError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_all_pending(&self) -> QueueResult<Vec<Envelope>> {
        with_connection(&self.pool, move |conn| {
            let mut stmt = conn
                .inner()
                .prepare(SELECT_PENDING_LIKE)
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            let rows = stmt
                .query_map([], row_to_envelope)
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| QueueError::Backend(e.to_string()))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn gc_expired(&self) -> QueueResult<()> {
        let max_attempts = self.max_attempts;
        with_connection(&self.pool, move |conn| {
            let now = epoch(Utc::now());
            let expired = conn
                .execute(GC_EXPIRE, params![now, now])
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            let exhausted = conn
                .execute(GC_FAIL_EXHAUSTED, params![now, now, max_attempts])
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            if expired > 0 || exhausted > 0 {
                debug!(expired, exhausted, "gc swept envelopes");
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn reap_old(&self, days: i64) -> QueueResult<usize> {
        with_connection(&self.pool, move |conn| {
            let cutoff = epoch(Utc::now() - chrono::Duration::days(days));
            let deleted = conn
                .execute(REAP_OLD, params![cutoff])
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            if deleted > 0 {
                debug!(deleted, "reaped terminal envelopes");
            }
            Ok(deleted)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> QueueResult<QueueStats> {
        with_connection(&self.pool, move |conn| {
            let mut stats = QueueStats::default();
            {
                let mut stmt = conn
                    .inner()
                    .prepare(SELECT_STATS)
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                let rows = stmt
                    .query_map([], |row| {
                        let status: String = row.get(0)?;
                        let count: i64 = row.get(1)?;
                        Ok((status, count as u64))
                    })
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                for row in rows {
                    let (status, count) = row.map_err(|e| QueueError::Backend(e.to_string()))?;
                    stats.total += count;
                    match status.as_str() {
                        "pending" => stats.pending = count,
                        "sending" => stats.sending = count,
                        "sent" => stats.sent = count,
                        "failed" => stats.failed = count,
                        "expired" => stats.expired = count,
                        other => warn!(status = other, "unrecognized envelope status in stats"),
                    }
                }
            }
            stats.oldest_pending_created_at = conn
                .inner()
                .query_row(SELECT_OLDEST_PENDING, [], |row| row.get::<_, Option<i64>>(0))
                .optional()
                .map_err(|e| QueueError::Backend(e.to_string()))?
                .flatten()
                .map(from_epoch);
            Ok(stats)
        })
        .await
    }
}

/// Run `f` against a pooled connection on the blocking pool, the pattern
/// every read/write operation above shares.
async fn with_connection<T, F>(pool: &Arc<SqlitePool>, f: F) -> QueueResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SqliteConnection) -> QueueResult<T> + Send + 'static,
{
    let pool = Arc::clone(pool);
    tokio::task::spawn_blocking(move || {
        let conn = pool.get_sqlite_connection().map_err(|e| QueueError::Backend(e.to_string()))?;
        f(&conn)
    })
    .await
    .map_err(|e| QueueError::Backend(e.to_string()))?
}
