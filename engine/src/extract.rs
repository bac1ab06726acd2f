//! Value extraction.
//!
//! A column's value is first resolved structurally by path and coerced to
//! the column's semantic type. When the path does not resolve, the reader's
//! [`ExtractionStrategy`] gets a chance to compute the value from
//! non-structural logic.

use crate::{
    discovery::Diagnostics, error::Result, ColumnDef, ColumnPath, Document, Schema, SemanticType,
    Value,
};
use chrono::{NaiveDateTime, TimeZone, Utc};

/// Textual date format some writers store instead of a native date,
/// e.g. `Fri May 25 21:22:15 UTC 2007`.
pub const LEGACY_DATE_FORMAT: &str = "%a %b %d %H:%M:%S UTC %Y";

/// Per-reader extension points for discovery and extraction.
///
/// The default methods do nothing, so a reader only overrides what its
/// source needs.
pub trait ExtractionStrategy: Send + Sync {
    /// Called once per non-null top-level field during schema discovery,
    /// after the generic classifier has run. May add columns the generic
    /// classifier cannot see.
    fn discover(
        &self,
        _schema: &mut Schema,
        _field: &str,
        _value: &Value,
        _diagnostics: &mut Diagnostics,
    ) {
    }

    /// Called when a column's path does not resolve structurally.
    fn try_extract(&self, _path: &ColumnPath, _document: &Document) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Strategy for sources whose shape is fully described by paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl ExtractionStrategy for DefaultStrategy {}

/// Extract the value of `column` from `document`.
pub fn extract(
    column: &ColumnDef,
    document: &Document,
    strategy: &dyn ExtractionStrategy,
) -> Result<Option<Value>> {
    match column.path.resolve(document) {
        Some(value) => Ok(coerce(column.column_type, value)),
        None => strategy.try_extract(&column.path, document),
    }
}

/// Coerce a resolved value to a column's semantic type.
///
/// Structured columns collapse empty containers and scalars to `None`;
/// date/time columns convert native timestamps and legacy date strings.
/// Every other type passes the value through unchanged.
pub fn coerce(column_type: SemanticType, value: &Value) -> Option<Value> {
    match column_type {
        SemanticType::Structured => match value {
            Value::Document(d) if !d.is_empty() => Some(value.clone()),
            Value::Array(a) if !a.is_empty() => Some(value.clone()),
            _ => None,
        },
        SemanticType::DateTime => Some(coerce_datetime(value)),
        _ => Some(value.clone()),
    }
}

fn coerce_datetime(value: &Value) -> Value {
    match value {
        Value::Timestamp { time, .. } => Utc
            .timestamp_opt(i64::from(*time), 0)
            .single()
            .map(Value::DateTime)
            .unwrap_or_else(|| value.clone()),
        // Unparseable strings are returned as-is.
        Value::String(s) => match NaiveDateTime::parse_from_str(s, LEGACY_DATE_FORMAT) {
            Ok(naive) => Value::DateTime(naive.and_utc()),
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}
