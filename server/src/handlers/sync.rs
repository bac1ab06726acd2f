//! Sync handler - applies a change set to the configured collection.

use crate::error::{run_blocking, Result};
use crate::AppState;
use docsync_engine::{ChangeSet, ProviderConfig, RunStatus, Schema, SyncEngine, SyncReport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for a sync run.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub config: ProviderConfig,
    pub changes: ChangeSet,
    /// Abort the run on the first failed write
    #[serde(default)]
    pub fail_on_error: bool,
    /// Schema the rows were read with; marks identifier columns
    #[serde(default)]
    pub schema: Option<Schema>,
}

/// Response for a sync run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub run_id: Uuid,
    pub report: SyncReport,
    /// The change set after the run: assigned ids, cleared pending markers
    pub changes: ChangeSet,
    /// Messages logged during the run
    pub messages: Vec<String>,
}

/// Run one change set against the store.
pub async fn handle_sync(state: &AppState, request: SyncRequest) -> Result<SyncResponse> {
    let SyncRequest {
        mut config,
        mut changes,
        fail_on_error,
        schema,
    } = request;

    let run_id = Uuid::new_v4();
    let mut store = super::open_store(state, &mut config).await?;
    let connection = config.connection_string.clone();

    tracing::info!(
        "Sync run {} on {}: {} adds, {} updates, {} deletes",
        run_id,
        config.namespace(),
        changes.adds.len(),
        changes.updates.len(),
        changes.deletes.len()
    );

    let result = run_blocking(move || {
        let mut status = RunStatus::new().with_fail_on_error(fail_on_error);
        let report = {
            let mut engine = SyncEngine::connect(&mut store, &config)?;
            if let Some(schema) = &schema {
                engine = engine.with_schema(schema);
            }
            engine.execute(&mut changes, &mut status)?
        };

        Ok(SyncResponse {
            run_id,
            report,
            changes,
            messages: status.into_messages(),
        })
    })
    .await;

    // Writes can create databases and collections.
    state.names.invalidate_store(&connection);

    let response = result?;
    tracing::info!(
        "Sync run {} finished: {} added, {} updated, {} deleted, {} failed",
        run_id,
        response.report.added,
        response.report.updated,
        response.report.deleted,
        response.report.failed
    );
    Ok(response)
}
