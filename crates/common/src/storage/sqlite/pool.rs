//! SQLite connection pool
//!
//! Provides r2d2-based connection pooling for local SQLite databases.

use std::path::Path;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::connection::SqliteConnection;
use super::pragmas::apply_connection_pragmas;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::metrics::StorageMetrics;
use crate::storage::types::{
    Connection as ConnectionTrait, ConnectionPool, HealthStatus, PoolMetrics,
};

/// SQLite connection pool
///
/// Manages a pool of local SQLite connections using r2d2.
///
/// - Connection pooling (default: 5 connections)
/// - WAL mode for concurrency
/// - Connection timeout handling
/// - Structured tracing and logging
/// - Health checks with metrics
#[derive(Debug)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
    metrics: Arc<StorageMetrics>,
}

impl SqlitePool {
    /// Create a new SQLite connection pool
    #[instrument(fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        info!("creating sqlite connection pool");

        let metrics = Arc::new(StorageMetrics::new(config.max_size));

        let pool_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pool_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!("failed to create connection pool: {e}");
                StorageError::Connection(format!("failed to create pool: {e}"))
            })?;

        // Touch a connection on startup so misconfigurations surface early.
        {
            let conn = pool.get().map_err(|e| {
                warn!("failed to get test connection: {e}");
                StorageError::Connection(format!("failed to get test connection: {e}"))
            })?;
            drop(conn);
        }

        info!("sqlite pool created with {} connections", config.max_size);

        Ok(Self { pool, config, metrics })
    }

    /// Get the pool metrics
    pub fn metrics(&self) -> &Arc<StorageMetrics> {
        &self.metrics
    }
}

impl SqlitePool {
    /// Get a [`SqliteConnection`] from the pool
    #[instrument(skip(self), fields(pool_size = self.config.max_size))]
    pub fn get_sqlite_connection(&self) -> StorageResult<SqliteConnection> {
        let start = std::time::Instant::now();

        match self.pool.get() {
            Ok(conn) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                self.metrics.record_connection_acquired(duration_ms);

                debug!("connection acquired in {duration_ms}ms");

                Ok(SqliteConnection::new(conn))
            }
            Err(e) => {
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("timeout") {
                    self.metrics.record_connection_timeout();
                    warn!("connection timeout after {:?}", self.config.connection_timeout);
                    Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
                } else {
                    self.metrics.record_connection_error();
                    warn!("connection error: {e}");
                    Err(StorageError::Connection(format!("failed to get connection: {e}")))
                }
            }
        }
    }
}

impl ConnectionPool for SqlitePool {
    #[instrument(skip(self), fields(pool_size = self.config.max_size))]
    fn get_connection(&self) -> StorageResult<Box<dyn ConnectionTrait>> {
        self.get_sqlite_connection().map(|c| Box::new(c) as Box<dyn ConnectionTrait>)
    }

    fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.pool.state();

        match self.pool.get() {
            Ok(_conn) => Ok(HealthStatus::healthy(
                state.connections as usize,
                state.idle_connections as usize,
                self.config.max_size as usize,
            )),
            Err(e) => Ok(HealthStatus::unhealthy(format!("pool unhealthy: {e}"))),
        }
    }

    fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            connections_acquired: self
                .metrics
                .connections_acquired
                .load(std::sync::atomic::Ordering::Relaxed),
            connections_timeout: self
                .metrics
                .connections_timeout
                .load(std::sync::atomic::Ordering::Relaxed),
            connections_error: self
                .metrics
                .connections_error
                .load(std::sync::atomic::Ordering::Relaxed),
            avg_acquisition_time_ms: self.metrics.avg_connection_time_ms(),
            queries_executed: self
                .metrics
                .queries_executed
                .load(std::sync::atomic::Ordering::Relaxed),
            queries_failed: self.metrics.queries_failed.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_pool_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = SqlitePool::new(&db_path, SqlitePoolConfig::default()).unwrap();
        let conn = pool.get_connection().unwrap();

        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", &[]).unwrap();
    }

    #[test]
    fn test_concurrent_connections() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = Arc::new(SqlitePool::new(&db_path, SqlitePoolConfig::default()).unwrap());

        {
            let conn = pool.get_connection().unwrap();
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)", &[]).unwrap();
        }

        let mut handles = vec![];
        for i in 0..5 {
            let pool_clone = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                let conn = pool_clone.get_connection().unwrap();
                let value = format!("thread_{i}");
                conn.execute("INSERT INTO test (value) VALUES (?)", &[&value]).unwrap();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let conn = pool.get_sqlite_connection().unwrap();
        let count: i32 =
            conn.query_row("SELECT COUNT(*) FROM test", &[], |row| row.get(0)).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_health_check() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = SqlitePool::new(&db_path, SqlitePoolConfig::default()).unwrap();

        let health = pool.health_check().unwrap();
        assert!(health.healthy);
        assert_eq!(health.max_connections, 5);
    }
}
