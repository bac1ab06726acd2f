//! Column schema over flattened documents.
//!
//! A schema is an ordered list of column definitions. Lookups are always by
//! path, so ordering only affects presentation.

use crate::{ColumnPath, Value};
use serde::{Deserialize, Serialize};

/// Semantic types a column can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    String,
    Int32,
    Int64,
    Double,
    Decimal,
    Bool,
    DateTime,
    /// Unique identifier string
    Guid,
    /// Opaque nested subtree
    Structured,
    StringArray,
    IntArray,
}

impl SemanticType {
    /// Infer the semantic type of a sampled scalar.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => SemanticType::Bool,
            Value::Int32(_) => SemanticType::Int32,
            Value::Int64(_) => SemanticType::Int64,
            Value::Double(_) => SemanticType::Double,
            Value::Decimal(_) => SemanticType::Decimal,
            Value::Uuid(_) => SemanticType::Guid,
            Value::DateTime(_) => SemanticType::DateTime,
            _ => SemanticType::String,
        }
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticType::String => write!(f, "String"),
            SemanticType::Int32 => write!(f, "Int32"),
            SemanticType::Int64 => write!(f, "Int64"),
            SemanticType::Double => write!(f, "Double"),
            SemanticType::Decimal => write!(f, "Decimal"),
            SemanticType::Bool => write!(f, "Bool"),
            SemanticType::DateTime => write!(f, "DateTime"),
            SemanticType::Guid => write!(f, "Guid"),
            SemanticType::Structured => write!(f, "Structured"),
            SemanticType::StringArray => write!(f, "StringArray"),
            SemanticType::IntArray => write!(f, "IntArray"),
        }
    }
}

/// Definition of one addressable output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Location of the value inside a document
    pub path: ColumnPath,
    /// Semantic type of the column
    pub column_type: SemanticType,
    /// Whether the column holds a store-native identifier
    pub is_identifier: bool,
    /// Whether the column is part of the comparison key
    pub is_key: bool,
    /// Whether the column is read and written
    pub included: bool,
    /// Display position, assigned when the schema is ordered
    pub ordinal: i32,
}

impl ColumnDef {
    /// Create an included, editable column.
    pub fn new(path: impl Into<ColumnPath>, column_type: SemanticType) -> Self {
        Self {
            path: path.into(),
            column_type,
            is_identifier: false,
            is_key: false,
            included: true,
            ordinal: -1,
        }
    }

    /// Create a read-only identifier column.
    pub fn identifier(path: impl Into<ColumnPath>) -> Self {
        Self {
            is_identifier: true,
            ..Self::new(path, SemanticType::String)
        }
    }

    /// Create a column holding a whole subtree.
    pub fn structured(path: impl Into<ColumnPath>) -> Self {
        Self::new(path, SemanticType::Structured)
    }

    /// Create a column holding an array of scalars.
    pub fn string_array(path: impl Into<ColumnPath>) -> Self {
        Self::new(path, SemanticType::StringArray)
    }

    /// Builder-style method to mark the column as a key.
    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Identifier columns are never written back.
    pub fn is_editable(&self) -> bool {
        !self.is_identifier
    }
}

/// Presentation order of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaOrder {
    /// Order in which columns were discovered
    Discovery,
    /// Sorted by path
    #[default]
    Alphabetical,
}

/// An ordered set of column definitions, unique by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SchemaColumns")]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

/// Wire form of a schema. Decoded columns pass through `add_if_absent`, so
/// a repeated path keeps its first definition.
#[derive(Deserialize)]
struct SchemaColumns {
    #[serde(default)]
    columns: Vec<ColumnDef>,
}

impl From<SchemaColumns> for Schema {
    fn from(wire: SchemaColumns) -> Self {
        wire.columns
            .into_iter()
            .fold(Schema::new(), |schema, column| schema.with_column(column))
    }
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Add a column unless one with the same path already exists.
    ///
    /// Returns `true` when the column was inserted. The first definition of
    /// a path always wins.
    pub fn add_if_absent(&mut self, column: ColumnDef) -> bool {
        if self.contains(&column.path) {
            return false;
        }
        self.columns.push(column);
        true
    }

    /// Builder-style method to add a column.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.add_if_absent(column);
        self
    }

    pub fn get(&self, path: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.path.as_str() == path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.path.as_str() == path)
    }

    pub fn contains(&self, path: &ColumnPath) -> bool {
        self.get(path.as_str()).is_some()
    }

    /// All columns in schema order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Columns that take part in reads and writes.
    pub fn included(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.included)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Order the columns and renumber their ordinals.
    pub fn apply_order(&mut self, order: SchemaOrder) {
        if order == SchemaOrder::Alphabetical {
            self.columns.sort_by(|a, b| a.path.cmp(&b.path));
        }
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.ordinal = i as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_definition_wins() {
        let mut schema = Schema::new();
        assert!(schema.add_if_absent(ColumnDef::new("age", SemanticType::Int32)));
        assert!(!schema.add_if_absent(ColumnDef::new("age", SemanticType::String)));

        assert_eq!(schema.len(), 1);
        assert_eq!(schema.get("age").unwrap().column_type, SemanticType::Int32);
    }

    #[test]
    fn decoded_schema_keeps_first_definition_per_path() {
        let schema: Schema = serde_json::from_value(serde_json::json!({
            "columns": [
                {"path": "a", "columnType": "string", "isIdentifier": false,
                 "isKey": false, "included": true, "ordinal": 0},
                {"path": "a", "columnType": "int32", "isIdentifier": false,
                 "isKey": false, "included": true, "ordinal": 1},
            ]
        }))
        .unwrap();

        assert_eq!(schema.len(), 1);
        assert_eq!(schema.get("a").unwrap().column_type, SemanticType::String);
    }

    #[test]
    fn identifier_columns_are_read_only() {
        let id = ColumnDef::identifier("_id");
        assert!(id.is_identifier);
        assert!(!id.is_editable());
        assert_eq!(id.column_type, SemanticType::String);
        assert!(ColumnDef::new("name", SemanticType::String).is_editable());
    }

    #[test]
    fn alphabetical_order_renumbers() {
        let mut schema = Schema::new()
            .with_column(ColumnDef::new("zeta", SemanticType::String))
            .with_column(ColumnDef::structured("alpha"))
            .with_column(ColumnDef::new("alpha|b", SemanticType::String));

        schema.apply_order(SchemaOrder::Alphabetical);
        let paths: Vec<_> = schema.columns().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["alpha", "alpha|b", "zeta"]);
        assert_eq!(schema.get("zeta").unwrap().ordinal, 2);
    }

    #[test]
    fn discovery_order_is_kept() {
        let mut schema = Schema::new()
            .with_column(ColumnDef::new("zeta", SemanticType::String))
            .with_column(ColumnDef::new("alpha", SemanticType::String));

        schema.apply_order(SchemaOrder::Discovery);
        assert_eq!(schema.columns()[0].path.as_str(), "zeta");
        assert_eq!(schema.columns()[0].ordinal, 0);
    }

    #[test]
    fn infer_types() {
        assert_eq!(SemanticType::infer(&Value::Bool(true)), SemanticType::Bool);
        assert_eq!(SemanticType::infer(&Value::Int64(1)), SemanticType::Int64);
        assert_eq!(
            SemanticType::infer(&Value::Decimal("1.5".into())),
            SemanticType::Decimal
        );
        assert_eq!(
            SemanticType::infer(&Value::Timestamp {
                time: 1,
                increment: 1
            }),
            SemanticType::String
        );
    }

    #[test]
    fn schema_serialization() {
        let schema = Schema::new()
            .with_column(ColumnDef::identifier("_id"))
            .with_column(ColumnDef::new("price", SemanticType::Decimal).with_key(true));

        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("\"columnType\":\"decimal\""));
        let parsed: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, parsed);
    }

    #[test]
    fn semantic_type_display() {
        assert_eq!(SemanticType::Structured.to_string(), "Structured");
        assert_eq!(SemanticType::IntArray.to_string(), "IntArray");
    }
}
