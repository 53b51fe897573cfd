//! Storage configuration
//!
//! Provides configuration types for the storage layer, including connection
//! pool settings and SQLite pragmas.

use std::path::PathBuf;
use std::time::Duration;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database file path
    pub path: PathBuf,

    /// Connection pool size (default: 5)
    pub pool_size: u32,

    /// Connection timeout in seconds (default: 5)
    pub connection_timeout_secs: u64,

    /// Busy timeout in milliseconds (default: 5000)
    pub busy_timeout_ms: u64,

    /// Enable WAL mode (default: true)
    pub enable_wal: bool,

    /// Enable foreign keys (default: true)
    pub enable_foreign_keys: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/queue.db"),
            pool_size: 5,
            connection_timeout_secs: 5,
            busy_timeout_ms: 5000,
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl StorageConfig {
    /// Create a new configuration with the given path
    pub fn new(path: PathBuf) -> Self {
        Self { path, ..Default::default() }
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns an error if any configuration value is out of range.
    pub fn validate(&self) -> Result<(), super::error::StorageError> {
        use super::error::StorageError;

        if self.pool_size == 0 {
            return Err(StorageError::InvalidConfig(
                "pool_size must be greater than 0".to_string(),
            ));
        }
        if self.pool_size > 100 {
            return Err(StorageError::InvalidConfig("pool_size too large (max: 100)".to_string()));
        }

        if self.connection_timeout_secs == 0 {
            return Err(StorageError::InvalidConfig(
                "connection_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(StorageError::InvalidConfig(
                "busy_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.path.as_os_str().is_empty() {
            return Err(StorageError::InvalidConfig("database path cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Set the connection pool size
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the busy timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Disable WAL mode (not recommended for production)
    pub fn without_wal(mut self) -> Self {
        self.enable_wal = false;
        self
    }

    /// Disable foreign key constraints (not recommended for production)
    pub fn without_foreign_keys(mut self) -> Self {
        self.enable_foreign_keys = false;
        self
    }

    /// Create a builder for more complex configurations
    pub fn builder(path: PathBuf) -> StorageConfigBuilder {
        StorageConfigBuilder::new(path)
    }
}

/// Builder for [`StorageConfig`] with validation
#[derive(Debug)]
pub struct StorageConfigBuilder {
    config: StorageConfig,
}

impl StorageConfigBuilder {
    /// Create a new builder
    pub fn new(path: PathBuf) -> Self {
        Self { config: StorageConfig::new(path) }
    }

    /// Set pool size
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout_secs = timeout.as_secs();
        self
    }

    /// Set busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Disable WAL mode
    pub fn disable_wal(mut self) -> Self {
        self.config.enable_wal = false;
        self
    }

    /// Disable foreign keys
    pub fn disable_foreign_keys(mut self) -> Self {
        self.config.enable_foreign_keys = false;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<StorageConfig, crate::storage::error::StorageError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.connection_timeout_secs, 5);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.enable_wal);
        assert!(config.enable_foreign_keys);
    }

    #[test]
    fn test_config_builder_method_chaining() {
        let temp_path = std::env::temp_dir().join("agent-test.db");
        let config = StorageConfig::new(temp_path)
            .with_pool_size(20)
            .with_connection_timeout(Duration::from_secs(10))
            .with_busy_timeout(Duration::from_millis(10000))
            .without_wal()
            .without_foreign_keys();

        assert_eq!(config.pool_size, 20);
        assert_eq!(config.connection_timeout_secs, 10);
        assert_eq!(config.busy_timeout_ms, 10000);
        assert!(!config.enable_wal);
        assert!(!config.enable_foreign_keys);
    }

    #[test]
    fn test_config_validation() {
        let temp_path = std::env::temp_dir().join("agent-test.db");

        let config = StorageConfig::builder(temp_path.clone()).pool_size(150).build();
        assert!(config.is_err());

        let config = StorageConfig::builder(temp_path).pool_size(0).build();
        assert!(config.is_err());
    }
}
