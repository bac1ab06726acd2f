//! Request handlers for catalog, read and sync operations.

mod catalog;
mod read;
mod sync;

pub use catalog::*;
pub use read::*;
pub use sync::*;

use crate::db::PgDocumentStore;
use crate::error::Result;
use crate::AppState;
use docsync_engine::ProviderConfig;
use tokio::runtime::Handle;

/// The connection string a request targets, falling back to the server's
/// own store when the request leaves it empty.
fn resolve_connection(state: &AppState, requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => state.config.database_url.clone(),
    }
}

/// Validate a provider configuration and open the store it names.
async fn open_store(state: &AppState, config: &mut ProviderConfig) -> Result<PgDocumentStore> {
    config.connection_string = resolve_connection(state, Some(config.connection_string.as_str()));
    config.validate()?;

    let pool = state.pools.get(&config.connection_string).await?;
    Ok(PgDocumentStore::new(pool, Handle::current()))
}
