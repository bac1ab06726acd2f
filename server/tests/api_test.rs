//! Tests for the HTTP wire format.
//!
//! The protocol tests mirror the server's request and response bodies and
//! drive the engine against an in-memory store, so they need no database.
//! The live test needs a running server; set DOCSYNC_URL and run it with
//! `--ignored`.

use docsync_engine::{
    ChangeItem, ChangeSet, Document, MemoryStore, ProviderConfig, ReaderKind, Row, RowReader,
    RunStatus, Schema, SchemaDiscovery, SyncEngine, SyncPhase, SyncReport, Value,
};
use serde_json::json;

/// Mirror of the server's sync request body.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    config: ProviderConfig,
    changes: ChangeSet,
    #[serde(default)]
    fail_on_error: bool,
    #[serde(default)]
    schema: Option<Schema>,
}

/// Mirror of the server's sync response body.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    report: SyncReport,
    changes: ChangeSet,
    messages: Vec<String>,
}

/// Mirror of the server's rows response body.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RowsResponse {
    schema: Schema,
    rows: Vec<Row>,
}

fn run_sync(store: &mut MemoryStore, request: SyncRequest) -> SyncResponse {
    let SyncRequest {
        config,
        mut changes,
        fail_on_error,
        schema,
    } = request;
    let mut status = RunStatus::new().with_fail_on_error(fail_on_error);
    let report = {
        let mut engine = SyncEngine::connect(store, &config).unwrap();
        if let Some(schema) = &schema {
            engine = engine.with_schema(schema);
        }
        engine.execute(&mut changes, &mut status).unwrap()
    };
    SyncResponse {
        report,
        changes,
        messages: status.into_messages(),
    }
}

#[cfg(test)]
mod protocol_tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_partial_body() {
        let config: ProviderConfig = serde_json::from_value(json!({
            "connectionString": "",
            "database": "crm",
            "collection": "contacts"
        }))
        .unwrap();

        assert_eq!(config.schema_discovery_max_rows, 10);
        assert_eq!(config.update_batch_size, 1);
        assert_eq!(config.reader, ReaderKind::Generic);
        assert_eq!(config.payload_field, "json");
        // The server fills an empty connection string before validating.
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sync_request_round_trip() {
        let request: SyncRequest = serde_json::from_value(json!({
            "config": {
                "connectionString": "postgres://localhost/docsync",
                "database": "crm",
                "collection": "contacts"
            },
            "changes": {
                "adds": [
                    {"values": {"name": "Ada", "address|city": "London", "age": 36}},
                    {"values": {"name": "Skipped"}, "sync": false}
                ]
            },
            "failOnError": true
        }))
        .unwrap();
        assert!(request.fail_on_error);
        assert!(request.schema.is_none());

        let mut store = MemoryStore::new();
        let response = run_sync(&mut store, request);
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["report"]["added"], 1);
        assert_eq!(body["report"]["skipped"], 1);
        assert_eq!(
            body["report"]["phases"],
            json!(["adding", "done"])
        );

        let adds = body["changes"]["adds"].as_array().unwrap();
        assert_eq!(adds[0]["pending"], false);
        assert_eq!(adds[0]["assignedId"].as_str().unwrap().len(), 24);
        assert!(adds[1].get("assignedId").is_none());
        assert_eq!(body["changes"]["updates"], json!([]));
    }

    #[test]
    fn test_rows_response_serialization() {
        let namespace = docsync_engine::Namespace::new("crm", "contacts");
        let mut store = MemoryStore::new();
        store
            .seed(
                &namespace,
                vec![Document::from_json(json!({
                    "name": "Ada",
                    "address": {"city": "London"}
                }))
                .unwrap()],
            )
            .unwrap();

        let strategy = docsync_engine::DefaultStrategy;
        let schema = SchemaDiscovery::new(Default::default(), &strategy)
            .discover(&store, &namespace, &docsync_engine::Filter::All)
            .unwrap()
            .schema;
        let rows = RowReader::new(docsync_engine::Filter::All, &strategy)
            .read_all(&store, &namespace, &schema)
            .unwrap();

        let body = serde_json::to_value(RowsResponse { schema, rows }).unwrap();

        let columns = body["schema"]["columns"].as_array().unwrap();
        let paths: Vec<_> = columns.iter().map(|c| c["path"].as_str().unwrap()).collect();
        assert_eq!(paths, vec!["_id", "address", "address|city", "name"]);
        assert_eq!(columns[0]["isIdentifier"], true);
        assert_eq!(columns[1]["columnType"], "structured");

        let row = &body["rows"][0];
        assert_eq!(row["values"]["address|city"], "London");
        assert_eq!(row["values"]["address"], json!({"city": "London"}));
        assert_eq!(row["id"], row["values"]["_id"]["$oid"]);
    }

    #[test]
    fn test_change_values_use_extended_json() {
        let item: ChangeItem = serde_json::from_value(json!({
            "values": {"owner": {"$oid": "65f1c0a2e4b0a1b2c3d4e5f6"}, "count": {"$numberLong": "7"}},
            "targetId": "65f1c0a2e4b0a1b2c3d4e5f7"
        }))
        .unwrap();

        assert!(matches!(item.values["owner"], Value::ObjectId(_)));
        assert_eq!(item.values["count"], Value::Int64(7));
        assert!(item.sync);
        assert!(item.pending);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(
            serde_json::to_value(SyncPhase::Updating).unwrap(),
            json!("updating")
        );
    }
}

#[cfg(test)]
mod live_tests {
    use super::*;

    fn base_url() -> String {
        std::env::var("DOCSYNC_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running server"]
    async fn test_add_then_read_back() {
        let client = reqwest::Client::new();
        let collection = format!("live_{}", uuid::Uuid::new_v4().simple());
        let config = json!({"database": "docsync_tests", "collection": collection});

        let health: serde_json::Value = client
            .get(format!("{}/health", base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let sync: serde_json::Value = client
            .post(format!("{}/sync", base_url()))
            .json(&json!({
                "config": config,
                "changes": {"adds": [{"values": {"name": "Ada", "address|city": "London"}}]}
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(sync["report"]["added"], 1);

        let rows: serde_json::Value = client
            .post(format!("{}/rows", base_url()))
            .json(&json!({"config": config}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(rows["rows"][0]["values"]["address|city"], "London");

        let collections: serde_json::Value = client
            .get(format!("{}/databases/docsync_tests/collections", base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(collections["names"]
            .as_array()
            .unwrap()
            .contains(&json!(collection)));
    }
}
