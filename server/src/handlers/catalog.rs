//! Catalog handlers - database and collection names.

use crate::cache::NameKey;
use crate::db::PgDocumentStore;
use crate::error::{run_blocking, Result};
use crate::AppState;
use chrono::{DateTime, Utc};
use docsync_engine::DocumentStore;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

/// Query selecting which store to list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreQuery {
    /// Empty or absent means the server's own store
    #[serde(default)]
    pub connection_string: Option<String>,
}

/// A list of names, possibly served from cache.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamesResponse {
    pub names: Vec<String>,
    pub cached_at: DateTime<Utc>,
    pub from_cache: bool,
}

/// Response for cache invalidation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    pub dropped: usize,
}

/// List the databases of a store.
pub async fn handle_list_databases(state: &AppState, query: StoreQuery) -> Result<NamesResponse> {
    let connection = super::resolve_connection(state, query.connection_string.as_deref());
    let key = NameKey::Databases {
        store: connection.clone(),
    };
    cached_names(state, key, connection, |store| store.list_databases()).await
}

/// List the collections of one database.
pub async fn handle_list_collections(
    state: &AppState,
    database: String,
    query: StoreQuery,
) -> Result<NamesResponse> {
    let connection = super::resolve_connection(state, query.connection_string.as_deref());
    let key = NameKey::Collections {
        store: connection.clone(),
        database: database.clone(),
    };
    cached_names(state, key, connection, move |store| {
        store.list_collections(&database)
    })
    .await
}

/// Drop cached names for one store, or for every store when none is named.
pub fn handle_invalidate(state: &AppState, query: StoreQuery) -> InvalidateResponse {
    let dropped = match query.connection_string.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => state.names.invalidate_store(s),
        _ => state.names.clear(),
    };
    tracing::debug!("Invalidated {} cached name lists", dropped);
    InvalidateResponse { dropped }
}

async fn cached_names<F>(
    state: &AppState,
    key: NameKey,
    connection: String,
    list: F,
) -> Result<NamesResponse>
where
    F: FnOnce(&PgDocumentStore) -> docsync_engine::Result<Vec<String>> + Send + 'static,
{
    if let Some(cached) = state.names.get(&key) {
        return Ok(NamesResponse {
            names: cached.names,
            cached_at: cached.cached_at,
            from_cache: true,
        });
    }

    let pool = state.pools.get(&connection).await?;
    let store = PgDocumentStore::new(pool, Handle::current());
    let names = run_blocking(move || Ok(list(&store)?)).await?;

    let cached = state.names.put(key, names);
    Ok(NamesResponse {
        names: cached.names,
        cached_at: cached.cached_at,
        from_cache: false,
    })
}
