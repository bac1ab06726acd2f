//! Configuration management for the server.

use std::collections::HashSet;
use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL of the document store
    pub database_url: String,
    /// Maximum pooled store connections
    pub max_connections: u32,
    /// Further stores requests may target, besides `database_url`
    pub extra_stores: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let max_connections = env::var("MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidMaxConnections)?;

        let extra_stores = env::var("EXTRA_STORE_URLS")
            .map(|list| parse_store_list(&list))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            extra_stores,
        })
    }

    /// Connection strings requests are allowed to target.
    pub fn allowed_stores(&self) -> StoreAllowlist {
        StoreAllowlist::new(
            std::iter::once(self.database_url.clone()).chain(self.extra_stores.iter().cloned()),
        )
    }
}

/// Split a whitespace-separated list of connection strings.
fn parse_store_list(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_string).collect()
}

/// The fixed set of stores the server will connect to.
#[derive(Debug, Clone, Default)]
pub struct StoreAllowlist {
    stores: HashSet<String>,
}

impl StoreAllowlist {
    pub fn new(stores: impl IntoIterator<Item = String>) -> Self {
        Self {
            stores: stores.into_iter().collect(),
        }
    }

    pub fn contains(&self, connection_string: &str) -> bool {
        self.stores.contains(connection_string)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid MAX_CONNECTIONS value")]
    InvalidMaxConnections,
}
