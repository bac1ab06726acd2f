//! In-memory document store.
//!
//! Holds databases, collections and documents in process. Used by tests,
//! benches and callers that want to run the engine without a server.
//! Failures can be injected per operation kind so error policies are
//! observable.

use crate::{
    error::Result, path, store, Document, DocumentCursor, DocumentStore, Error, FieldSet, Filter,
    FindOptions, Namespace, ObjectId, SortOrder, Value,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

/// Store operation kinds, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListDatabases,
    ListCollections,
    Find,
    InsertOne,
    InsertMany,
    UpdateOne,
    DeleteOne,
    DeleteMany,
}

/// A collection of documents in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    documents: Vec<Document>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
        }
    }

    /// Get a document by identifier.
    pub fn get(&self, id: &ObjectId) -> Option<&Document> {
        self.position(id).map(|i| &self.documents[i])
    }

    /// Check if a document exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    fn position(&self, id: &ObjectId) -> Option<usize> {
        self.documents
            .iter()
            .position(|d| matches!(d.get("_id"), Some(Value::ObjectId(x)) if x == id))
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    op: StoreOp,
    filter: Filter,
    message: String,
}

/// The in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: BTreeMap<String, BTreeMap<String, Collection>>,
    failures: Vec<InjectedFailure>,
    calls: RefCell<HashMap<StoreOp, usize>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with documents, bypassing failure injection and
    /// call counting.
    pub fn seed(
        &mut self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<ObjectId>> {
        let stamped = documents
            .into_iter()
            .map(store::stamp_identifier)
            .collect::<Result<Vec<_>>>()?;

        let collection = self.collection_mut(namespace);
        Ok(stamped
            .into_iter()
            .map(|(id, doc)| {
                collection.documents.push(doc);
                id
            })
            .collect())
    }

    /// Make calls of `op` fail whenever a targeted document matches `filter`.
    ///
    /// Inserts test the new document; updates and deletes test the stored
    /// document. Other operations fail unconditionally.
    pub fn inject_failure(&mut self, op: StoreOp, filter: Filter, message: impl Into<String>) {
        self.failures.push(InjectedFailure {
            op,
            filter,
            message: message.into(),
        });
    }

    /// Remove all injected failures.
    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Number of calls made for an operation kind.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.borrow().get(&op).copied().unwrap_or(0)
    }

    /// Get a collection by namespace.
    pub fn collection(&self, namespace: &Namespace) -> Option<&Collection> {
        self.databases
            .get(&namespace.database)
            .and_then(|db| db.get(&namespace.collection))
    }

    /// Get a document by namespace and identifier.
    pub fn get(&self, namespace: &Namespace, id: &ObjectId) -> Option<&Document> {
        self.collection(namespace).and_then(|c| c.get(id))
    }

    /// Number of documents in a collection.
    pub fn count(&self, namespace: &Namespace) -> usize {
        self.collection(namespace).map_or(0, Collection::len)
    }

    fn collection_mut(&mut self, namespace: &Namespace) -> &mut Collection {
        self.databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default()
    }

    fn record(&self, op: StoreOp) {
        *self.calls.borrow_mut().entry(op).or_insert(0) += 1;
    }

    fn check_failure<'d>(
        &self,
        op: StoreOp,
        targets: impl Iterator<Item = &'d Document>,
    ) -> Result<()> {
        let rules: Vec<_> = self.failures.iter().filter(|f| f.op == op).collect();
        if rules.is_empty() {
            return Ok(());
        }

        let targets: Vec<_> = targets.collect();
        for rule in rules {
            let hit = if targets.is_empty() {
                rule.filter.is_all()
            } else {
                targets.iter().any(|d| rule.filter.matches(d))
            };
            if hit {
                return Err(Error::Store(rule.message.clone()));
            }
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn list_databases(&self) -> Result<Vec<String>> {
        self.record(StoreOp::ListDatabases);
        self.check_failure(StoreOp::ListDatabases, std::iter::empty())?;
        Ok(self.databases.keys().cloned().collect())
    }

    fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        self.record(StoreOp::ListCollections);
        self.check_failure(StoreOp::ListCollections, std::iter::empty())?;
        Ok(self
            .databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn find(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<DocumentCursor<'_>> {
        self.record(StoreOp::Find);
        self.check_failure(StoreOp::Find, std::iter::empty())?;

        let Some(collection) = self.collection(namespace) else {
            return Ok(Box::new(std::iter::empty()));
        };

        let mut matched: Vec<&Document> = collection
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .collect();

        if let Some(order) = options.sort {
            let null = Value::Null;
            matched.sort_by(|a, b| {
                let ordering = a
                    .get("_id")
                    .unwrap_or(&null)
                    .compare(b.get("_id").unwrap_or(&null));
                match order {
                    SortOrder::IdAscending => ordering,
                    SortOrder::IdDescending => ordering.reverse(),
                }
            });
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(Box::new(
            matched.into_iter().take(limit).cloned().map(Ok),
        ))
    }

    fn insert_one(&mut self, namespace: &Namespace, document: Document) -> Result<ObjectId> {
        self.record(StoreOp::InsertOne);
        let (id, document) = store::stamp_identifier(document)?;
        self.check_failure(StoreOp::InsertOne, std::iter::once(&document))?;

        let collection = self.collection_mut(namespace);
        if collection.contains(&id) {
            return Err(Error::DuplicateKey(id.to_string()));
        }
        collection.documents.push(document);
        Ok(id)
    }

    fn insert_many(
        &mut self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<ObjectId>> {
        self.record(StoreOp::InsertMany);
        let stamped = documents
            .into_iter()
            .map(store::stamp_identifier)
            .collect::<Result<Vec<_>>>()?;
        self.check_failure(StoreOp::InsertMany, stamped.iter().map(|(_, d)| d))?;

        // All-or-nothing: validate every identifier before inserting any.
        let collection = self.collection_mut(namespace);
        let mut seen = Vec::with_capacity(stamped.len());
        for (id, _) in &stamped {
            if collection.contains(id) || seen.contains(id) {
                return Err(Error::DuplicateKey(id.to_string()));
            }
            seen.push(*id);
        }

        collection
            .documents
            .extend(stamped.into_iter().map(|(_, d)| d));
        Ok(seen)
    }

    fn update_one(
        &mut self,
        namespace: &Namespace,
        id: &ObjectId,
        sets: &[FieldSet],
    ) -> Result<u64> {
        self.record(StoreOp::UpdateOne);
        let existing = self.get(namespace, id);
        self.check_failure(StoreOp::UpdateOne, existing.into_iter())?;

        let collection = self.collection_mut(namespace);
        let Some(index) = collection.position(id) else {
            return Ok(0);
        };

        // Apply to a copy so a failing set leaves the document untouched.
        let mut updated = collection.documents[index].clone();
        for set in sets {
            if set.path.as_str() == "_id" {
                return Err(Error::Store("the _id field cannot be modified".into()));
            }
            path::assign(&mut updated, set.path.as_str(), set.value.clone()).map_err(|e| match e {
                Error::MalformedDocument(message) => Error::Store(message),
                other => other,
            })?;
        }
        collection.documents[index] = updated;
        Ok(1)
    }

    fn delete_one(&mut self, namespace: &Namespace, id: &ObjectId) -> Result<u64> {
        self.record(StoreOp::DeleteOne);
        let existing = self.get(namespace, id);
        self.check_failure(StoreOp::DeleteOne, existing.into_iter())?;

        let collection = self.collection_mut(namespace);
        match collection.position(id) {
            Some(index) => {
                collection.documents.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_many(&mut self, namespace: &Namespace, ids: &[ObjectId]) -> Result<u64> {
        self.record(StoreOp::DeleteMany);
        let targets: Vec<&Document> = ids.iter().filter_map(|id| self.get(namespace, id)).collect();
        self.check_failure(StoreOp::DeleteMany, targets.into_iter())?;

        let collection = self.collection_mut(namespace);
        let before = collection.documents.len();
        collection
            .documents
            .retain(|d| !matches!(d.get("_id"), Some(Value::ObjectId(x)) if ids.contains(x)));
        Ok((before - collection.documents.len()) as u64)
    }
}
