//! HTTP route definitions.

mod catalog;
mod health;
mod read;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(catalog::routes())
        .merge(read::routes())
        .merge(sync::routes())
}
