//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres. Highlights are
//! read from a reader endpoint and written through a writer endpoint; both
//! pools are created once at startup and closed at shutdown.

use crate::error::{ApiError, ApiResult};
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Connection settings for one database endpoint.
#[derive(Debug, Clone)]
pub struct DbEndpoint {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
}

impl Default for DbEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "".to_string(),
        }
    }
}

impl DbEndpoint {
    /// Read `{prefix}_HOST`, `{prefix}_PORT`, `{prefix}_USER` and
    /// `{prefix}_PASSWORD`.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var(format!("{}_HOST", prefix)).unwrap_or(defaults.host),
            port: std::env::var(format!("{}_PORT", prefix))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            user: std::env::var(format!("{}_USER", prefix)).unwrap_or(defaults.user),
            password: std::env::var(format!("{}_PASSWORD", prefix)).unwrap_or_default(),
        }
    }
}

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Reader endpoint
    pub read: DbEndpoint,
    /// Writer endpoint
    pub write: DbEndpoint,
    /// Database name
    pub dbname: String,
    /// Maximum pool size per endpoint
    pub max_size: usize,
    /// Connection wait timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            read: DbEndpoint::default(),
            write: DbEndpoint::default(),
            dbname: "annotations".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Endpoints come from `DATABASE_READ_*` and `DATABASE_WRITE_*`, the
    /// database name from `DATABASE`.
    pub fn from_env() -> Self {
        Self {
            read: DbEndpoint::from_env("DATABASE_READ"),
            write: DbEndpoint::from_env("DATABASE_WRITE"),
            dbname: std::env::var("DATABASE").unwrap_or_else(|_| "annotations".to_string()),
            max_size: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("DATABASE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    fn create_pool(&self, endpoint: &DbEndpoint) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(endpoint.host.clone());
        cfg.port = Some(endpoint.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(endpoint.user.clone());
        cfg.password = Some(endpoint.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_config.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Reader and writer pools for the relational store.
#[derive(Clone)]
pub struct DbClient {
    read: Pool,
    write: Pool,
}

impl DbClient {
    /// Create a new database client with the given pools.
    pub fn new(read: Pool, write: Pool) -> Self {
        Self { read, write }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let read = config.create_pool(&config.read)?;
        let write = config.create_pool(&config.write)?;
        Ok(Self::new(read, write))
    }

    /// The writer pool, also used for the JSONB-backed notes table.
    pub fn write_pool(&self) -> &Pool {
        &self.write
    }

    /// Connection for reads.
    pub async fn reader(&self) -> ApiResult<Object> {
        Ok(self.read.get().await?)
    }

    /// Connection for writes and read-after-write.
    pub async fn writer(&self) -> ApiResult<Object> {
        Ok(self.write.get().await?)
    }

    /// Close both pools. Outstanding connections are dropped as they return.
    pub fn close(&self) {
        self.read.close();
        self.write.close();
    }
}
