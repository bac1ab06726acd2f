//! Read endpoint routes.

use axum::{extract::State, routing::post, Json, Router};
use docsync_engine::ProviderConfig;

use crate::error::Result;
use crate::handlers::{handle_discover, handle_rows, RowsRequest, RowsResponse, SchemaResponse};
use crate::AppState;

/// Create read routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/schema", post(schema_handler))
        .route("/rows", post(rows_handler))
}

/// POST /schema - Discover a collection's schema.
async fn schema_handler(
    State(state): State<AppState>,
    Json(config): Json<ProviderConfig>,
) -> Result<Json<SchemaResponse>> {
    let response = handle_discover(&state, config).await?;
    Ok(Json(response))
}

/// POST /rows - Read a collection as rows.
async fn rows_handler(
    State(state): State<AppState>,
    Json(request): Json<RowsRequest>,
) -> Result<Json<RowsResponse>> {
    let response = handle_rows(&state, request).await?;
    Ok(Json(response))
}
