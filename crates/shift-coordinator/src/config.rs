//! Process-level configuration: bind address, database URL, queue worker count. Per-provider
//! configuration (on-call window, outbound calling, IVR greeting, transfer number) is data
//! loaded through the [`crate::repository::Repository`], not process config — it lives on
//! [`crate::domain::Provider`].

use crate::constants::DEFAULT_QUEUE_WORKERS;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub bind_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0".to_string(),
            bind_port: 8080,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:path/to/file.db` or `sqlite::memory:`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub worker_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            worker_count: DEFAULT_QUEUE_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
}

/// Fluent builder mirroring `CallCenterServerBuilder`.
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database.url = url.into();
        self
    }

    pub fn with_in_memory_database(mut self) -> Self {
        self.config.database.url = "sqlite::memory:".to_string();
        self
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>, port: u16) -> Self {
        self.config.server.bind_addr = addr.into();
        self.config.server.bind_port = port;
        self
    }

    pub fn with_queue_workers(mut self, count: usize) -> Self {
        self.config.queue.worker_count = count;
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        self.config
    }
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
