//! Database connection pool management.

use crate::config::StoreAllowlist;
use crate::error::{AppError, Result};
use dashmap::DashMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the database pool.
pub type Pool = PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> std::result::Result<Pool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &Pool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Pools keyed by connection string.
///
/// Only stores on the allowlist are ever opened, so the registry holds at
/// most one pool per configured store. The server's own store is
/// registered at startup; the others are opened and migrated on first use.
pub struct PoolRegistry {
    allowed: StoreAllowlist,
    max_connections: u32,
    pools: DashMap<String, Pool>,
}

impl PoolRegistry {
    pub fn new(
        allowed: StoreAllowlist,
        default_url: impl Into<String>,
        default_pool: Pool,
        max_connections: u32,
    ) -> Self {
        let pools = DashMap::new();
        pools.insert(default_url.into(), default_pool);
        Self {
            allowed,
            max_connections,
            pools,
        }
    }

    /// The pool for a connection string, opening it if needed.
    pub async fn get(&self, connection_string: &str) -> Result<Pool> {
        if let Some(pool) = self.pools.get(connection_string) {
            return Ok(pool.clone());
        }
        if !self.allowed.contains(connection_string) {
            return Err(AppError::Forbidden(
                "connection string is not configured on this server".to_string(),
            ));
        }

        tracing::info!("Opening pool for a configured store");
        let pool = create_pool(connection_string, self.max_connections).await?;
        run_migrations(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(self
            .pools
            .entry(connection_string.to_string())
            .or_insert(pool)
            .clone())
    }

    /// Number of open pools.
    pub fn open_pools(&self) -> usize {
        self.pools.len()
    }

    /// Number of stores that may be opened.
    pub fn allowed_stores(&self) -> usize {
        self.allowed.len()
    }
}
