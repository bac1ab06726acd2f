//! The document store collaborator.
//!
//! The engine talks to the store only through [`DocumentStore`]. Every call
//! blocks until the store responds; a handle is acquired once per run and
//! reused for every operation in that run.

use crate::{error::Result, ColumnPath, Document, Error, Filter, ObjectId, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A forward-only cursor over query results, consumed once per read pass.
pub type DocumentCursor<'a> = Box<dyn Iterator<Item = Result<Document>> + 'a>;

/// Database and collection a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Sort order over the identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    IdAscending,
    /// Most recently created first
    IdDescending,
}

/// Options for a find call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
}

impl FindOptions {
    /// The newest `limit` documents, newest first.
    pub fn latest(limit: usize) -> Self {
        Self {
            sort: Some(SortOrder::IdDescending),
            limit: Some(limit),
        }
    }
}

/// One field-level assignment of an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSet {
    /// Field to assign; intermediate documents are created when missing
    pub path: ColumnPath,
    pub value: Value,
}

impl FieldSet {
    pub fn new(path: impl Into<ColumnPath>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Make sure a document carries an ObjectId `_id`, generating one when it
/// is absent or null. A generated `_id` becomes the first field.
pub fn stamp_identifier(mut document: Document) -> Result<(ObjectId, Document)> {
    let existing = match document.get("_id") {
        Some(Value::ObjectId(id)) => Some(*id),
        None | Some(Value::Null) => None,
        Some(other) => return Err(Error::InvalidObjectId(other.to_string())),
    };
    if let Some(id) = existing {
        return Ok((id, document));
    }

    let id = ObjectId::new();
    let mut stamped = Document::new();
    stamped.insert("_id", id);
    document.remove("_id");
    for (k, v) in document {
        stamped.insert(k, v);
    }
    Ok((id, stamped))
}

/// Blocking access to a schema-less document store.
pub trait DocumentStore {
    /// Names of all databases.
    fn list_databases(&self) -> Result<Vec<String>>;

    /// Names of all collections in a database.
    fn list_collections(&self, database: &str) -> Result<Vec<String>>;

    /// Query a collection.
    fn find(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<DocumentCursor<'_>>;

    /// Insert one document, returning its identifier. Documents without an
    /// `_id` field receive a generated one.
    fn insert_one(&mut self, namespace: &Namespace, document: Document) -> Result<ObjectId>;

    /// Insert a batch of documents with one store call.
    fn insert_many(
        &mut self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<ObjectId>>;

    /// Apply all field sets to the document with the given identifier as
    /// one combined operation. Returns the number of documents matched.
    fn update_one(&mut self, namespace: &Namespace, id: &ObjectId, sets: &[FieldSet])
        -> Result<u64>;

    /// Delete the document with the given identifier.
    fn delete_one(&mut self, namespace: &Namespace, id: &ObjectId) -> Result<u64>;

    /// Delete every document whose identifier is in `ids`.
    fn delete_many(&mut self, namespace: &Namespace, ids: &[ObjectId]) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_display() {
        assert_eq!(Namespace::new("crm", "contacts").to_string(), "crm.contacts");
    }

    #[test]
    fn stamp_generates_leading_identifier() {
        let mut doc = Document::new();
        doc.insert("name", "Alice");
        doc.insert("_id", Value::Null);

        let (id, stamped) = stamp_identifier(doc).unwrap();
        assert_eq!(stamped.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stamped.get("_id"), Some(&Value::ObjectId(id)));
        assert_eq!(stamped.len(), 2);

        let (same, _) = stamp_identifier(stamped).unwrap();
        assert_eq!(same, id);

        let mut bad = Document::new();
        bad.insert("_id", 5);
        assert!(matches!(stamp_identifier(bad), Err(Error::InvalidObjectId(_))));
    }

    #[test]
    fn latest_sorts_newest_first() {
        let options = FindOptions::latest(10);
        assert_eq!(options.sort, Some(SortOrder::IdDescending));
        assert_eq!(options.limit, Some(10));
        assert_eq!(FindOptions::default().limit, None);
    }
}
