//! Applying change sets to the document store.
//!
//! A run visits `Connected -> Adding -> Updating -> Deleting -> Done`,
//! skipping phases with nothing to do. Each unit of work (one item, or
//! one batch of adds or deletes) is applied and reported independently:
//!
//! - progress is reported after every unit, including failed ones
//! - with fail-on-error off a failed unit is logged and the run continues
//! - with fail-on-error on the first failure aborts the run
//! - cancellation is polled before each unit and stops all later phases
//!
//! Updates are always applied item by item. Automation hooks only run in
//! item-by-item mode.

use crate::{
    error::Result,
    path,
    status::SyncStatus,
    ChangeItem, ChangeKind, ChangeSet, Document, DocumentStore, Error, FieldSet, Namespace,
    ObjectId, ProviderConfig, Schema, Value,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Callbacks around each applied item.
///
/// Every method has a no-op default.
pub trait Automation {
    fn before_add(&self, _item: &ChangeItem) {}
    fn after_add(&self, _item: &ChangeItem, _id: &str) {}
    fn before_update(&self, _item: &ChangeItem, _id: &str) {}
    fn after_update(&self, _item: &ChangeItem, _id: &str) {}
    fn before_delete(&self, _item: &ChangeItem, _id: &str) {}
    fn after_delete(&self, _item: &ChangeItem, _id: &str) {}
}

/// Automation that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAutomation;

impl Automation for NoAutomation {}

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Idle,
    Connected,
    Adding,
    Updating,
    Deleting,
    Done,
}

impl SyncPhase {
    fn for_kind(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Add => SyncPhase::Adding,
            ChangeKind::Update => SyncPhase::Updating,
            ChangeKind::Delete => SyncPhase::Deleting,
        }
    }
}

/// Summary of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Phases entered, in order
    pub phases: Vec<SyncPhase>,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Items processed without being applied because their sync flag was off
    pub skipped: usize,
    /// Items in units that failed
    pub failed: usize,
    pub cancelled: bool,
}

impl SyncReport {
    fn count_applied(&mut self, kind: ChangeKind, n: usize) {
        match kind {
            ChangeKind::Add => self.added += n,
            ChangeKind::Update => self.updated += n,
            ChangeKind::Delete => self.deleted += n,
        }
    }
}

/// Applies change sets to one collection.
pub struct SyncEngine<'a, S: DocumentStore + ?Sized> {
    store: &'a mut S,
    namespace: Namespace,
    batch_size: usize,
    schema: Option<&'a Schema>,
    automation: &'a dyn Automation,
    phase: SyncPhase,
}

impl<'a, S: DocumentStore + ?Sized> SyncEngine<'a, S> {
    /// Validate the configuration and bind the engine to its collection.
    pub fn connect(store: &'a mut S, config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let namespace = config.namespace();
        info!(
            namespace = %namespace,
            batch_size = config.update_batch_size,
            "sync engine connected"
        );
        Ok(Self {
            store,
            namespace,
            batch_size: config.update_batch_size,
            schema: None,
            automation: &NoAutomation,
            phase: SyncPhase::Connected,
        })
    }

    /// Builder-style method to set the automation callbacks.
    pub fn with_automation(mut self, automation: &'a dyn Automation) -> Self {
        self.automation = automation;
        self
    }

    /// Builder-style method to set the column schema. Identifier columns
    /// in it are never updated, and their values are stored as ObjectIds
    /// on add.
    pub fn with_schema(mut self, schema: &'a Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Apply a change set.
    ///
    /// Items are updated in place: added items receive their assigned
    /// identifier and processed items lose their pending marker. Returns
    /// the first error when the status asks to fail on errors.
    pub fn execute(
        &mut self,
        changes: &mut ChangeSet,
        status: &mut dyn SyncStatus,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for kind in [ChangeKind::Add, ChangeKind::Update, ChangeKind::Delete] {
            let items = changes.items_mut(kind);
            if items.is_empty() {
                continue;
            }
            if !status.continue_processing() {
                report.cancelled = true;
                break;
            }

            self.phase = SyncPhase::for_kind(kind);
            report.phases.push(self.phase);
            debug!(namespace = %self.namespace, %kind, items = items.len(), "phase started");

            let batched = self.batch_size > 1 && kind != ChangeKind::Update;
            if batched {
                self.run_batches(kind, items, status, &mut report)?;
            } else {
                self.run_items(kind, items, status, &mut report)?;
            }

            if report.cancelled {
                break;
            }
        }

        self.phase = SyncPhase::Done;
        report.phases.push(SyncPhase::Done);
        info!(
            namespace = %self.namespace,
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            "sync run finished"
        );
        Ok(report)
    }

    fn run_items(
        &mut self,
        kind: ChangeKind,
        items: &mut [ChangeItem],
        status: &mut dyn SyncStatus,
        report: &mut SyncReport,
    ) -> Result<()> {
        let total = items.len();
        for (index, item) in items.iter_mut().enumerate() {
            if !status.continue_processing() {
                report.cancelled = true;
                break;
            }

            let outcome = self.apply_item(kind, item);
            status.progress(total, index + 1);

            match outcome {
                Ok(applied) => {
                    item.pending = false;
                    if applied {
                        report.count_applied(kind, 1);
                    } else {
                        report.skipped += 1;
                    }
                }
                Err(e) => {
                    let target = item_target(kind, item);
                    handle_error(Error::write(kind, target, e), 1, status, report)?;
                }
            }
        }
        Ok(())
    }

    /// Apply one item with its hooks. Returns whether the store was written.
    fn apply_item(&mut self, kind: ChangeKind, item: &mut ChangeItem) -> Result<bool> {
        match kind {
            ChangeKind::Add => {
                self.automation.before_add(item);
                if item.sync {
                    let document = self.build_document(item)?;
                    let id = self.store.insert_one(&self.namespace, document)?;
                    item.assigned_id = Some(id.to_string());
                    self.automation.after_add(item, &id.to_string());
                }
            }
            ChangeKind::Update => {
                let id = item.target();
                self.automation.before_update(item, id);
                if item.sync {
                    let object_id = ObjectId::parse_str(id)?;
                    let sets = self.field_sets(item);
                    if !sets.is_empty() {
                        let matched = self.store.update_one(&self.namespace, &object_id, &sets)?;
                        if matched == 0 {
                            debug!(id, "update matched no document");
                        }
                    }
                    self.automation.after_update(item, id);
                }
            }
            ChangeKind::Delete => {
                let id = item.target();
                self.automation.before_delete(item, id);
                if item.sync {
                    let object_id = ObjectId::parse_str(id)?;
                    self.store.delete_one(&self.namespace, &object_id)?;
                    self.automation.after_delete(item, id);
                }
            }
        }
        Ok(item.sync)
    }

    fn run_batches(
        &mut self,
        kind: ChangeKind,
        items: &mut [ChangeItem],
        status: &mut dyn SyncStatus,
        report: &mut SyncReport,
    ) -> Result<()> {
        let total = items.len();
        let mut processed = 0;

        for chunk in items.chunks_mut(self.batch_size) {
            if !status.continue_processing() {
                report.cancelled = true;
                break;
            }

            let outcome = match kind {
                ChangeKind::Add => self.add_batch(chunk),
                _ => self.delete_batch(chunk),
            };
            processed += chunk.len();
            status.progress(total, processed);

            match outcome {
                Ok(applied) => {
                    for item in chunk.iter_mut() {
                        item.pending = false;
                    }
                    report.count_applied(kind, applied);
                    report.skipped += chunk.len() - applied;
                }
                Err(e) => {
                    let target = format!("batch of {}", chunk.len());
                    handle_error(Error::write(kind, target, e), chunk.len(), status, report)?;
                }
            }
        }
        Ok(())
    }

    /// Insert every synced item of a chunk with one call.
    fn add_batch(&mut self, chunk: &mut [ChangeItem]) -> Result<usize> {
        let documents = chunk
            .iter()
            .filter(|item| item.sync)
            .map(|item| self.build_document(item))
            .collect::<Result<Vec<_>>>()?;
        if documents.is_empty() {
            return Ok(0);
        }

        let ids = self.store.insert_many(&self.namespace, documents)?;
        let mut ids = ids.into_iter();
        for item in chunk.iter_mut().filter(|item| item.sync) {
            item.assigned_id = ids.next().map(|id| id.to_string());
        }
        Ok(chunk.iter().filter(|item| item.sync).count())
    }

    /// Delete every synced item of a chunk with one call.
    fn delete_batch(&mut self, chunk: &mut [ChangeItem]) -> Result<usize> {
        let ids = chunk
            .iter()
            .filter(|item| item.sync)
            .map(|item| ObjectId::parse_str(item.target()))
            .collect::<Result<Vec<_>>>()?;
        if ids.is_empty() {
            return Ok(0);
        }

        self.store.delete_many(&self.namespace, &ids)?;
        Ok(ids.len())
    }

    /// Build the document inserted for an add item. Column paths become
    /// nested documents; `_id` is written first.
    fn build_document(&self, item: &ChangeItem) -> Result<Document> {
        let mut document = Document::new();
        if let Some(candidate) = item.values.get("_id") {
            if !candidate.is_null() {
                document.insert("_id", to_object_id(candidate)?);
            }
        }

        for (column, value) in &item.values {
            if column == "_id" {
                continue;
            }
            let value = if self.is_identifier(column) && !value.is_null() {
                to_object_id(value)?
            } else {
                value.clone()
            };
            path::assign(&mut document, column, value)?;
        }
        Ok(document)
    }

    /// One field set per changed, writable column.
    fn field_sets(&self, item: &ChangeItem) -> Vec<FieldSet> {
        item.values
            .iter()
            .filter(|(column, _)| column.as_str() != "_id" && !self.is_identifier(column))
            .map(|(column, value)| FieldSet::new(column.as_str(), value.clone()))
            .collect()
    }

    fn is_identifier(&self, column: &str) -> bool {
        self.schema
            .and_then(|schema| schema.get(column))
            .is_some_and(|c| !c.is_editable())
    }
}

fn to_object_id(value: &Value) -> Result<Value> {
    match value {
        Value::ObjectId(_) => Ok(value.clone()),
        other => Ok(Value::ObjectId(ObjectId::parse_str(&other.to_string())?)),
    }
}

fn item_target(kind: ChangeKind, item: &ChangeItem) -> String {
    match (kind, item.values.get("_id")) {
        (ChangeKind::Add, Some(id)) if !id.is_null() => id.to_string(),
        (ChangeKind::Add, _) => "new document".to_string(),
        _ => item.target().to_string(),
    }
}

/// Apply the failure policy to a failed unit of `size` items.
fn handle_error(
    error: Error,
    size: usize,
    status: &mut dyn SyncStatus,
    report: &mut SyncReport,
) -> Result<()> {
    report.failed += size;
    if status.fail_on_error() {
        return Err(error);
    }
    warn!(error = %error, "write failed, continuing");
    status.log_message(&error.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{status::RunStatus, ColumnDef, MemoryStore, StoreOp};
    use serde_json::json;
    use std::cell::RefCell;

    fn config(batch: usize) -> ProviderConfig {
        let mut config = ProviderConfig::new("memory://", "db", "people");
        config.update_batch_size = batch;
        config
    }

    fn ns() -> Namespace {
        Namespace::new("db", "people")
    }

    fn seeded(n: usize) -> (MemoryStore, Vec<ObjectId>) {
        let mut store = MemoryStore::new();
        let docs = (0..n)
            .map(|i| Document::from_json(json!({"n": i})).unwrap())
            .collect();
        let ids = store.seed(&ns(), docs).unwrap();
        (store, ids)
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl Automation for Recorder {
        fn before_add(&self, _item: &ChangeItem) {
            self.calls.borrow_mut().push("before_add".into());
        }
        fn after_add(&self, _item: &ChangeItem, id: &str) {
            self.calls.borrow_mut().push(format!("after_add {}", id));
        }
        fn before_update(&self, _item: &ChangeItem, id: &str) {
            self.calls.borrow_mut().push(format!("before_update {}", id));
        }
        fn after_update(&self, _item: &ChangeItem, id: &str) {
            self.calls.borrow_mut().push(format!("after_update {}", id));
        }
        fn before_delete(&self, _item: &ChangeItem, id: &str) {
            self.calls.borrow_mut().push(format!("before_delete {}", id));
        }
        fn after_delete(&self, _item: &ChangeItem, id: &str) {
            self.calls.borrow_mut().push(format!("after_delete {}", id));
        }
    }

    #[test]
    fn connect_validates_configuration() {
        let mut store = MemoryStore::new();
        let result = SyncEngine::connect(&mut store, &ProviderConfig::default());
        assert!(matches!(result, Err(Error::MissingSetting(_))));

        let engine = SyncEngine::connect(&mut store, &config(1)).unwrap();
        assert_eq!(engine.phase(), SyncPhase::Connected);
    }

    #[test]
    fn add_builds_nested_documents_and_assigns_ids() {
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.adds.push(ChangeItem::add([
            ("name", Value::from("Alice")),
            ("address|city", Value::from("Oslo")),
            ("address|zip", Value::from("0150")),
        ]));
        let mut status = RunStatus::new();

        let report = SyncEngine::connect(&mut store, &config(1))
            .unwrap()
            .execute(&mut changes, &mut status)
            .unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(
            report.phases,
            vec![SyncPhase::Adding, SyncPhase::Done]
        );
        let item = &changes.adds[0];
        assert!(!item.pending);
        let id = ObjectId::parse_str(item.assigned_id.as_deref().unwrap()).unwrap();
        let stored = store.get(&ns(), &id).unwrap();
        assert_eq!(
            path::resolve(stored, "address|city"),
            Some(&Value::from("Oslo"))
        );
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
    }

    #[test]
    fn add_uses_candidate_identifier() {
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.adds.push(ChangeItem::add([
            ("_id", "65f1c0a2e4b0a1b2c3d4e5f6"),
            ("name", "Bob"),
        ]));

        SyncEngine::connect(&mut store, &config(1))
            .unwrap()
            .execute(&mut changes, &mut RunStatus::new())
            .unwrap();

        assert_eq!(
            changes.adds[0].assigned_id.as_deref(),
            Some("65f1c0a2e4b0a1b2c3d4e5f6")
        );
    }

    #[test]
    fn unsynced_items_are_processed_but_not_applied() {
        let (mut store, ids) = seeded(1);
        let mut changes = ChangeSet::new();
        changes
            .deletes
            .push(ChangeItem::delete(ids[0].to_string()).with_sync(false));

        let report = SyncEngine::connect(&mut store, &config(1))
            .unwrap()
            .execute(&mut changes, &mut RunStatus::new())
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 0);
        assert!(!changes.deletes[0].pending);
        assert_eq!(store.count(&ns()), 1);
    }

    #[test]
    fn update_sets_changed_fields_only() {
        let (mut store, ids) = seeded(1);
        let schema = Schema::new()
            .with_column(ColumnDef::identifier("_id"))
            .with_column(ColumnDef::identifier("owner"));
        let mut changes = ChangeSet::new();
        changes.updates.push(ChangeItem::update(
            ids[0].to_string(),
            [
                ("meta|tag", Value::from("x")),
                ("owner", Value::from("ignored")),
                ("_id", Value::from("ignored")),
            ],
        ));

        let report = SyncEngine::connect(&mut store, &config(10))
            .unwrap()
            .with_schema(&schema)
            .execute(&mut changes, &mut RunStatus::new())
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(store.calls(StoreOp::UpdateOne), 1);
        let stored = store.get(&ns(), &ids[0]).unwrap();
        assert_eq!(path::resolve(stored, "meta|tag"), Some(&Value::from("x")));
        assert_eq!(stored.get("owner"), None);
        assert_eq!(stored.get("n"), Some(&Value::Int32(0)));
    }

    #[test]
    fn per_item_hooks_run_in_order() {
        let (mut store, ids) = seeded(1);
        let recorder = Recorder::default();
        let mut changes = ChangeSet::new();
        changes.adds.push(ChangeItem::add([("name", "Alice")]));
        changes.deletes.push(ChangeItem::delete(ids[0].to_string()));

        SyncEngine::connect(&mut store, &config(1))
            .unwrap()
            .with_automation(&recorder)
            .execute(&mut changes, &mut RunStatus::new())
            .unwrap();

        let calls = recorder.calls.borrow();
        let assigned = changes.adds[0].assigned_id.clone().unwrap();
        assert_eq!(
            *calls,
            vec![
                "before_add".to_string(),
                format!("after_add {}", assigned),
                format!("before_delete {}", ids[0]),
                format!("after_delete {}", ids[0]),
            ]
        );
    }

    #[test]
    fn unsynced_items_fire_only_before_hooks() {
        let (mut store, ids) = seeded(2);
        let recorder = Recorder::default();
        let mut changes = ChangeSet::new();
        changes
            .adds
            .push(ChangeItem::add([("name", "Alice")]).with_sync(false));
        changes.updates.push(
            ChangeItem::update(ids[0].to_string(), [("name", "Bob")]).with_sync(false),
        );
        changes
            .deletes
            .push(ChangeItem::delete(ids[1].to_string()).with_sync(false));

        let report = SyncEngine::connect(&mut store, &config(1))
            .unwrap()
            .with_automation(&recorder)
            .execute(&mut changes, &mut RunStatus::new())
            .unwrap();

        assert_eq!(report.skipped, 3);
        assert_eq!(
            *recorder.calls.borrow(),
            vec![
                "before_add".to_string(),
                format!("before_update {}", ids[0]),
                format!("before_delete {}", ids[1]),
            ]
        );
        assert!(changes.adds[0].assigned_id.is_none());
        assert_eq!(store.count(&ns()), 2);
    }

    #[test]
    fn batched_mode_skips_hooks() {
        let (mut store, ids) = seeded(3);
        let recorder = Recorder::default();
        let mut changes = ChangeSet::new();
        changes.deletes = ids.iter().map(|id| ChangeItem::delete(id.to_string())).collect();

        SyncEngine::connect(&mut store, &config(2))
            .unwrap()
            .with_automation(&recorder)
            .execute(&mut changes, &mut RunStatus::new())
            .unwrap();

        assert!(recorder.calls.borrow().is_empty());
        assert_eq!(store.calls(StoreOp::DeleteMany), 2);
        assert_eq!(store.count(&ns()), 0);
    }

    #[test]
    fn batched_add_assigns_ids_in_order() {
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.adds = (0..5)
            .map(|i| ChangeItem::add([("n", i)]).with_sync(i != 2))
            .collect();
        let mut status = RunStatus::new();

        let report = SyncEngine::connect(&mut store, &config(3))
            .unwrap()
            .execute(&mut changes, &mut status)
            .unwrap();

        assert_eq!(store.calls(StoreOp::InsertMany), 2);
        assert_eq!(report.added, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(status.progress_history(), &[(5, 3), (5, 5)]);
        assert!(changes.adds[2].assigned_id.is_none());
        for item in changes.adds.iter().filter(|i| i.sync) {
            let id = ObjectId::parse_str(item.assigned_id.as_deref().unwrap()).unwrap();
            assert_eq!(store.get(&ns(), &id).unwrap().get("n"), item.values.get("n"));
        }
    }

    #[test]
    fn invalid_target_is_a_write_error() {
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.deletes.push(ChangeItem::delete("not-an-id"));
        let mut status = RunStatus::new().with_fail_on_error(true);

        let err = SyncEngine::connect(&mut store, &config(1))
            .unwrap()
            .execute(&mut changes, &mut status)
            .unwrap_err();

        assert!(matches!(err, Error::Write { kind: ChangeKind::Delete, .. }));
        assert!(matches!(err.root_cause(), Error::InvalidObjectId(_)));
        assert!(changes.deletes[0].pending);
        assert_eq!(status.progress_history(), &[(1, 1)]);
    }

    #[test]
    fn cancellation_stops_later_phases() {
        let (mut store, ids) = seeded(2);
        let mut changes = ChangeSet::new();
        changes.adds.push(ChangeItem::add([("name", "a")]));
        changes.deletes = ids.iter().map(|id| ChangeItem::delete(id.to_string())).collect();

        let mut status = RunStatus::new();
        status.cancel_handle().cancel();

        let report = SyncEngine::connect(&mut store, &config(1))
            .unwrap()
            .execute(&mut changes, &mut status)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.phases, vec![SyncPhase::Done]);
        assert_eq!(store.count(&ns()), 2);
        assert!(changes.adds[0].pending);
    }
}
