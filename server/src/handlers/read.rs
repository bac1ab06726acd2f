//! Read handlers - schema discovery and row materialization.

use crate::error::{run_blocking, AppError, Result};
use crate::AppState;
use docsync_engine::{ProviderConfig, Row, RowReader, Schema, SchemaDiscovery};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// Response for schema discovery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaResponse {
    pub schema: Schema,
    /// Fields skipped or defaulted while sampling
    pub diagnostics: Vec<String>,
    /// Number of documents sampled
    pub sampled: usize,
}

/// Request body for a row read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsRequest {
    pub config: ProviderConfig,
    /// Discovered on the fly when absent
    #[serde(default)]
    pub schema: Option<Schema>,
    /// Stop after this many rows
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Response for a row read.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsResponse {
    pub schema: Schema,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// Discover the schema of the configured collection.
pub async fn handle_discover(state: &AppState, mut config: ProviderConfig) -> Result<SchemaResponse> {
    let store = super::open_store(state, &mut config).await?;

    run_blocking(move || {
        let strategy = config.strategy();
        let outcome = SchemaDiscovery::new(config.discovery_options(), strategy.as_ref()).discover(
            &store,
            &config.namespace(),
            &config.filter()?,
        )?;

        tracing::info!(
            "Discovered {} columns in {} from {} documents",
            outcome.schema.len(),
            config.namespace(),
            outcome.sampled
        );

        Ok(SchemaResponse {
            schema: outcome.schema,
            diagnostics: outcome.diagnostics,
            sampled: outcome.sampled,
        })
    })
    .await
}

/// Materialize rows of the configured collection.
pub async fn handle_rows(state: &AppState, request: RowsRequest) -> Result<RowsResponse> {
    let RowsRequest {
        mut config,
        schema,
        limit,
    } = request;
    if limit == Some(0) {
        return Err(AppError::BadRequest("limit must be at least 1".to_string()));
    }
    let store = super::open_store(state, &mut config).await?;

    run_blocking(move || {
        let strategy = config.strategy();
        let namespace = config.namespace();
        let filter = config.filter()?;

        let (schema, diagnostics) = match schema {
            Some(schema) => (schema, Vec::new()),
            None => {
                let outcome = SchemaDiscovery::new(config.discovery_options(), strategy.as_ref())
                    .discover(&store, &namespace, &filter)?;
                (outcome.schema, outcome.diagnostics)
            }
        };

        let mut rows = Vec::new();
        RowReader::new(filter, strategy.as_ref()).for_each_row(
            &store,
            &namespace,
            &schema,
            |row| {
                rows.push(row);
                match limit {
                    Some(n) if rows.len() >= n => ControlFlow::Break(()),
                    _ => ControlFlow::Continue(()),
                }
            },
        )?;

        Ok(RowsResponse {
            schema,
            rows,
            diagnostics,
        })
    })
    .await
}
