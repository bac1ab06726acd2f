//! Catalog endpoint routes.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};

use crate::error::Result;
use crate::handlers::{
    handle_invalidate, handle_list_collections, handle_list_databases, InvalidateResponse,
    NamesResponse, StoreQuery,
};
use crate::AppState;

/// Create catalog routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/databases", get(databases_handler))
        .route("/databases/cache", delete(invalidate_handler))
        .route("/databases/{database}/collections", get(collections_handler))
}

/// GET /databases - List database names.
async fn databases_handler(
    State(state): State<AppState>,
    Query(query): Query<StoreQuery>,
) -> Result<Json<NamesResponse>> {
    let response = handle_list_databases(&state, query).await?;
    Ok(Json(response))
}

/// GET /databases/{database}/collections - List collection names.
async fn collections_handler(
    State(state): State<AppState>,
    Path(database): Path<String>,
    Query(query): Query<StoreQuery>,
) -> Result<Json<NamesResponse>> {
    let response = handle_list_collections(&state, database, query).await?;
    Ok(Json(response))
}

/// DELETE /databases/cache - Invalidate cached names.
async fn invalidate_handler(
    State(state): State<AppState>,
    Query(query): Query<StoreQuery>,
) -> Json<InvalidateResponse> {
    Json(handle_invalidate(&state, query))
}
