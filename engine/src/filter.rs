//! Document filters.
//!
//! The configured filter expression is passed through to the store. Its
//! syntax is a JSON object whose keys are dotted field paths and whose
//! values must be contained in the matching document: scalars compare for
//! equality, nested objects match by containment, and a scalar matches an
//! array that holds it. An empty expression matches every document.

use crate::{error::Result, Document, Error, Value};
use std::cmp::Ordering;

/// A parsed document filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    /// Match every document
    #[default]
    All,
    /// Match documents containing every listed field value
    Contains(Document),
}

impl Filter {
    /// Parse a filter expression. Empty or blank text matches everything.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(Filter::All);
        }

        let json: serde_json::Value = serde_json::from_str(expression)
            .map_err(|e| Error::InvalidFilter(e.to_string()))?;
        if !json.is_object() {
            return Err(Error::InvalidFilter("filter must be a JSON object".into()));
        }

        match Document::from_json(json) {
            Some(doc) if doc.is_empty() => Ok(Filter::All),
            Some(doc) => {
                check_overlapping_keys(&doc)?;
                Ok(Filter::Contains(doc))
            }
            None => Err(Error::InvalidFilter(
                "filter must be a document, not a single value".into(),
            )),
        }
    }

    /// Filter on a single field path.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut doc = Document::new();
        doc.insert(field, value);
        Filter::Contains(doc)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    /// Check whether a document satisfies the filter.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Contains(expected) => expected.iter().all(|(field, value)| {
                lookup_dotted(document, field).is_some_and(|actual| contains(actual, value))
            }),
        }
    }

    /// The filter as one nested JSON object, dotted keys expanded.
    ///
    /// This is the containment document handed to JSON stores.
    pub fn to_containment_json(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        if let Filter::Contains(doc) = self {
            for (field, value) in doc.iter() {
                let segments: Vec<&str> = field.split('.').collect();
                insert_dotted(&mut root, &segments, value.to_json());
            }
        }
        serde_json::Value::Object(root)
    }
}

fn insert_dotted(
    node: &mut serde_json::Map<String, serde_json::Value>,
    segments: &[&str],
    value: serde_json::Value,
) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        node.insert(first.to_string(), value);
        return;
    }

    let entry = node
        .entry(first.to_string())
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if !entry.is_object() {
        *entry = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(child) = entry {
        insert_dotted(child, rest, value);
    }
}

/// A key that is a dotted prefix of another key would overlap it once the
/// filter is expanded into one nested document.
fn check_overlapping_keys(doc: &Document) -> Result<()> {
    for outer in doc.keys() {
        for inner in doc.keys() {
            if inner.len() > outer.len()
                && inner.starts_with(outer.as_str())
                && inner.as_bytes()[outer.len()] == b'.'
            {
                return Err(Error::InvalidFilter(format!(
                    "keys '{}' and '{}' overlap",
                    outer, inner
                )));
            }
        }
    }
    Ok(())
}

fn lookup_dotted<'a>(document: &'a Document, field: &str) -> Option<&'a Value> {
    let mut segments = field.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Document(a), Value::Document(e)) => e
            .iter()
            .all(|(k, v)| a.get(k).is_some_and(|av| contains(av, v))),
        (Value::Array(a), Value::Array(e)) => {
            e.iter().all(|ev| a.iter().any(|av| contains(av, ev)))
        }
        (Value::Array(a), scalar) => a.iter().any(|av| contains(av, scalar)),
        (a, e) => a == e || (is_number(a) && is_number(e) && a.compare(e) == Ordering::Equal),
    }
}

fn is_number(value: &Value) -> bool {
    matches!(
        value,
        Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal(_)
    )
}
