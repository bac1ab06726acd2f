//! Row materialization.
//!
//! Each fetched document becomes one flat [`Row`]: the document identifier
//! plus one value per included column. Unlike discovery, a failure here is
//! never swallowed; it is reported with the offending document's `_id`.

use crate::{
    error::Result,
    extract::{extract, ExtractionStrategy},
    ColumnPath, Document, DocumentStore, Error, Filter, FindOptions, Namespace, Schema, Value,
};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::ops::ControlFlow;
use tracing::debug;

/// A flattened document.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Stable identifier of the source document
    pub id: String,
    /// One entry per included column, in schema order
    pub values: Vec<(ColumnPath, Option<Value>)>,
}

impl Row {
    /// Value of a column; `None` when the column is absent or null.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(p, _)| p.as_str() == path)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        struct Values<'a>(&'a [(ColumnPath, Option<Value>)]);

        impl Serialize for Values<'_> {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (path, value) in self.0 {
                    map.serialize_entry(path.as_str(), value)?;
                }
                map.end()
            }
        }

        let mut row = serializer.serialize_struct("Row", 2)?;
        row.serialize_field("id", &self.id)?;
        row.serialize_field("values", &Values(&self.values))?;
        row.end()
    }
}

/// Build the row for one document.
pub fn materialize(
    document: &Document,
    schema: &Schema,
    strategy: &dyn ExtractionStrategy,
) -> Result<Row> {
    let id = match document.get("_id") {
        None | Some(Value::Null) => return Err(Error::MissingIdentifier),
        Some(id) => id.to_identifier_string(),
    };

    let mut values = Vec::with_capacity(schema.len());
    for column in schema.included() {
        let value = extract(column, document, strategy).map_err(|e| Error::materialize(&id, e))?;
        values.push((column.path.clone(), value));
    }

    Ok(Row { id, values })
}

/// Streams rows out of a collection.
pub struct RowReader<'a> {
    filter: Filter,
    strategy: &'a dyn ExtractionStrategy,
}

impl<'a> RowReader<'a> {
    pub fn new(filter: Filter, strategy: &'a dyn ExtractionStrategy) -> Self {
        Self { filter, strategy }
    }

    /// Materialize every matching document and hand it to `visit`.
    ///
    /// The pass stops early when `visit` breaks. Returns the number of rows
    /// visited.
    pub fn for_each_row<S, F>(
        &self,
        store: &S,
        namespace: &Namespace,
        schema: &Schema,
        mut visit: F,
    ) -> Result<usize>
    where
        S: DocumentStore + ?Sized,
        F: FnMut(Row) -> ControlFlow<()>,
    {
        let mut count = 0;
        for entry in store.find(namespace, &self.filter, &FindOptions::default())? {
            let row = materialize(&entry?, schema, self.strategy)?;
            count += 1;
            if visit(row).is_break() {
                break;
            }
        }
        debug!(namespace = %namespace, rows = count, "read pass finished");
        Ok(count)
    }

    /// Materialize every matching document.
    pub fn read_all<S>(&self, store: &S, namespace: &Namespace, schema: &Schema) -> Result<Vec<Row>>
    where
        S: DocumentStore + ?Sized,
    {
        let mut rows = Vec::new();
        self.for_each_row(store, namespace, schema, |row| {
            rows.push(row);
            ControlFlow::Continue(())
        })?;
        Ok(rows)
    }
}
