//! Tagged-field records.
//!
//! Some sources store an item's fields as one array of records under a
//! payload field:
//!
//! ```json
//! { "json": [
//!     { "label": "Amount", "type": "money",
//!       "values": [ { "value": 10.5, "currency": "USD" } ] },
//!     { "label": "Status", "type": "category",
//!       "values": [ { "value": { "id": 2, "text": "Open" } } ] }
//! ] }
//! ```
//!
//! Such fields cannot be addressed structurally. [`TaggedFieldDecoder`]
//! exposes them as `<payload>|<label>` for the primary value and
//! `<payload>|<label>|<subname>` for secondary parts, decoding each record
//! according to its type tag.

use crate::{
    discovery::Diagnostics, error::Result, extract::ExtractionStrategy, ColumnDef, ColumnPath,
    Document, Error, Schema, SemanticType, Value,
};
use chrono::{NaiveDate, NaiveDateTime};

/// Default name of the field holding the record array.
pub const DEFAULT_PAYLOAD_FIELD: &str = "json";

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Extraction strategy for tagged-field record arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedFieldDecoder {
    payload_field: String,
}

impl Default for TaggedFieldDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_FIELD)
    }
}

/// A borrowed view of one field record.
struct FieldRecord<'a> {
    label: &'a str,
    tag: &'a str,
    instances: Vec<&'a Document>,
}

impl<'a> FieldRecord<'a> {
    fn parse(value: &'a Value) -> Result<Self> {
        let record = value
            .as_document()
            .ok_or_else(|| malformed(format!("field record is a {}", value.kind_name())))?;
        let label = string_field(record, "label")?;
        let tag = string_field(record, "type")?;
        let instances = record
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_document).collect())
            .unwrap_or_default();
        Ok(Self {
            label,
            tag,
            instances,
        })
    }

    fn first(&self) -> Option<&'a Document> {
        self.instances.first().copied()
    }

    fn is_multi_valued(&self) -> bool {
        self.instances.len() > 1
    }
}

impl TaggedFieldDecoder {
    pub fn new(payload_field: impl Into<String>) -> Self {
        Self {
            payload_field: payload_field.into(),
        }
    }

    pub fn payload_field(&self) -> &str {
        &self.payload_field
    }

    /// Decode the value addressed by `label` and `subname` from a payload.
    pub fn decode(
        &self,
        payload: &Value,
        label: &str,
        subname: Option<&str>,
    ) -> Result<Option<Value>> {
        let records = records(payload)?;
        for entry in records.iter() {
            let record = FieldRecord::parse(entry)?;
            if record.label == label {
                return Ok(decode_record(&record, subname));
            }
        }
        Ok(None)
    }

    fn column_base(&self, label: &str) -> ColumnPath {
        ColumnPath::from_segments([self.payload_field.as_str(), label])
    }

    fn discover_record(&self, schema: &mut Schema, record: &FieldRecord<'_>) {
        let base = self.column_base(record.label);
        let multi = record.is_multi_valued();
        let columns = match record.tag {
            "app" | "category" => vec![
                ColumnDef::new(
                    base.child("id"),
                    if multi {
                        SemanticType::IntArray
                    } else {
                        SemanticType::Int64
                    },
                ),
                ColumnDef::new(
                    base,
                    if multi {
                        SemanticType::StringArray
                    } else {
                        SemanticType::String
                    },
                ),
            ],
            "money" => vec![
                ColumnDef::new(base.child("currency"), SemanticType::String),
                ColumnDef::new(base, SemanticType::Decimal),
            ],
            "date" => vec![
                ColumnDef::new(base.child("start_date"), SemanticType::DateTime),
                ColumnDef::new(base.child("end"), SemanticType::DateTime),
                ColumnDef::new(base.child("end_date"), SemanticType::DateTime),
                ColumnDef::new(base, SemanticType::DateTime),
            ],
            "contact" | "image" => vec![
                ColumnDef::new(base.child("id"), SemanticType::Int64),
                ColumnDef::new(base, SemanticType::String),
            ],
            "embed" => vec![
                ColumnDef::new(base.child("title"), SemanticType::String),
                ColumnDef::new(base, SemanticType::String),
            ],
            _ => vec![ColumnDef::new(base, SemanticType::String)],
        };
        for column in columns {
            schema.add_if_absent(column);
        }
    }
}

impl ExtractionStrategy for TaggedFieldDecoder {
    fn discover(
        &self,
        schema: &mut Schema,
        field: &str,
        value: &Value,
        diagnostics: &mut Diagnostics,
    ) {
        if field != self.payload_field {
            return;
        }
        let records = match records(value) {
            Ok(records) => records,
            Err(e) => {
                diagnostics.note(format!("skipping payload '{}': {}", field, e));
                return;
            }
        };
        for entry in records.iter() {
            match FieldRecord::parse(entry) {
                Ok(record) => self.discover_record(schema, &record),
                Err(e) => diagnostics.note(format!("skipping record in '{}': {}", field, e)),
            }
        }
    }

    fn try_extract(&self, path: &ColumnPath, document: &Document) -> Result<Option<Value>> {
        let segments = path.segments();
        let (label, subname) = match segments.as_slice() {
            [root, label] if *root == self.payload_field => (*label, None),
            [root, label, subname] if *root == self.payload_field => (*label, Some(*subname)),
            _ => return Ok(None),
        };
        match document.get(&self.payload_field) {
            None | Some(Value::Null) => Ok(None),
            Some(payload) => self.decode(payload, label, subname),
        }
    }
}

/// The record array of a payload. A string payload holds the array as
/// JSON text.
fn records(payload: &Value) -> Result<std::borrow::Cow<'_, [Value]>> {
    match payload {
        Value::Array(items) => Ok(std::borrow::Cow::Borrowed(items.as_slice())),
        Value::String(text) => {
            let json: serde_json::Value =
                serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
            match Value::from_json(json) {
                Value::Array(items) => Ok(std::borrow::Cow::Owned(items)),
                other => Err(malformed(format!(
                    "payload holds a {}, expected an array",
                    other.kind_name()
                ))),
            }
        }
        other => Err(malformed(format!(
            "payload is a {}, expected an array",
            other.kind_name()
        ))),
    }
}

fn decode_record(record: &FieldRecord<'_>, subname: Option<&str>) -> Option<Value> {
    let first = record.first()?;
    match record.tag {
        "app" => {
            let key = if subname == Some("id") { "item_id" } else { "title" };
            collect_all(record, |instance| nested(instance, "value", key))
        }
        "category" => {
            let key = if subname == Some("id") { "id" } else { "text" };
            collect_all(record, |instance| nested(instance, "value", key))
        }
        "money" => {
            let key = if subname == Some("currency") {
                "currency"
            } else {
                "value"
            };
            present(first.get(key))
        }
        "date" => decode_date(first, subname),
        "contact" => {
            let key = match subname {
                Some("id") => "profile_id",
                Some(other) => other,
                None => "name",
            };
            nested(first, "value", key)
        }
        "image" => {
            let key = match subname {
                Some("id") => "file_id",
                Some(other) => other,
                None => "link",
            };
            nested(first, "value", key)
        }
        "embed" => nested(first, "embed", subname.unwrap_or("url")),
        _ => present(first.get("value")),
    }
}

/// Values of every instance: one value stays scalar, several become a
/// sorted array.
fn collect_all<F>(record: &FieldRecord<'_>, pick: F) -> Option<Value>
where
    F: Fn(&Document) -> Option<Value>,
{
    let mut values: Vec<Value> = record.instances.iter().copied().filter_map(pick).collect();
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => {
            values.sort_by(|a, b| a.compare(b));
            Some(Value::Array(values))
        }
    }
}

fn decode_date(instance: &Document, subname: Option<&str>) -> Option<Value> {
    match subname {
        None | Some("start") => timestamp(instance, "start"),
        Some("end") => timestamp(instance, "end"),
        Some(key @ ("start_date" | "end_date")) => {
            let raw = present(instance.get(key))?;
            Some(match raw.as_str().map(|s| NaiveDate::parse_from_str(s, DATE_FORMAT)) {
                Some(Ok(date)) => date
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| Value::DateTime(dt.and_utc()))
                    .unwrap_or(raw),
                _ => raw,
            })
        }
        Some(other) => present(instance.get(other)),
    }
}

/// A start or end timestamp, preferring the UTC rendering.
fn timestamp(instance: &Document, key: &str) -> Option<Value> {
    let utc_key = format!("{}_utc", key);
    let raw = present(instance.get(&utc_key)).or_else(|| present(instance.get(key)))?;
    Some(
        match raw
            .as_str()
            .map(|s| NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT))
        {
            Some(Ok(naive)) => Value::DateTime(naive.and_utc()),
            _ => raw,
        },
    )
}

fn nested(instance: &Document, container: &str, key: &str) -> Option<Value> {
    present(instance.get(container)?.as_document()?.get(key))
}

fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

fn string_field<'a>(record: &'a Document, key: &str) -> Result<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("field record has no string '{}'", key)))
}

fn malformed(message: String) -> Error {
    Error::MalformedDocument(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    fn item() -> Document {
        doc(json!({
            "_id": {"$oid": "65f1c0a2e4b0a1b2c3d4e5f6"},
            "json": [
                {"label": "Amount", "type": "money",
                 "values": [{"value": 10.5, "currency": "USD"}]},
                {"label": "Status", "type": "category",
                 "values": [{"value": {"id": 2, "text": "Open"}}]},
                {"label": "Tags", "type": "category",
                 "values": [
                    {"value": {"id": 9, "text": "urgent"}},
                    {"value": {"id": 3, "text": "billing"}}
                 ]},
                {"label": "Customer", "type": "app",
                 "values": [{"value": {"item_id": 77, "title": "Acme"}}]},
                {"label": "Due", "type": "date",
                 "values": [{
                    "start": "2024-03-01 10:00:00",
                    "start_utc": "2024-03-01 09:00:00",
                    "start_date": "2024-03-01",
                    "end_date": "2024-03-05"
                 }]},
                {"label": "Owner", "type": "contact",
                 "values": [{"value": {"profile_id": 5, "name": "Alice", "mail": "a@x.io"}}]},
                {"label": "Logo", "type": "image",
                 "values": [{"value": {"file_id": 12, "link": "https://img/12"}}]},
                {"label": "Site", "type": "embed",
                 "values": [{"embed": {"url": "https://acme.io", "title": "Acme"}}]},
                {"label": "Notes", "type": "text",
                 "values": [{"value": "hello"}]},
                {"label": "Empty", "type": "text", "values": []},
                {"label": "Missing", "type": "money"}
            ]
        }))
    }

    fn get(path: &str) -> Option<Value> {
        TaggedFieldDecoder::default()
            .try_extract(&ColumnPath::new(path), &item())
            .unwrap()
    }

    #[test]
    fn money_amount_and_currency() {
        assert_eq!(get("json|Amount"), Some(Value::Double(10.5)));
        assert_eq!(get("json|Amount|currency"), Some(Value::from("USD")));
    }

    #[test]
    fn category_single_and_multi_valued() {
        assert_eq!(get("json|Status"), Some(Value::from("Open")));
        assert_eq!(get("json|Status|id"), Some(Value::Int32(2)));

        assert_eq!(
            get("json|Tags"),
            Some(Value::Array(vec![
                Value::from("billing"),
                Value::from("urgent")
            ]))
        );
        assert_eq!(
            get("json|Tags|id"),
            Some(Value::Array(vec![Value::Int32(3), Value::Int32(9)]))
        );
    }

    #[test]
    fn app_reference() {
        assert_eq!(get("json|Customer"), Some(Value::from("Acme")));
        assert_eq!(get("json|Customer|id"), Some(Value::Int32(77)));
    }

    #[test]
    fn date_components() {
        let utc = |y, m, d, h| Value::DateTime(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap());
        assert_eq!(get("json|Due"), Some(utc(2024, 3, 1, 9)));
        assert_eq!(get("json|Due|start_date"), Some(utc(2024, 3, 1, 0)));
        assert_eq!(get("json|Due|end_date"), Some(utc(2024, 3, 5, 0)));
        assert_eq!(get("json|Due|end"), None);
    }

    #[test]
    fn inner_properties() {
        assert_eq!(get("json|Owner"), Some(Value::from("Alice")));
        assert_eq!(get("json|Owner|id"), Some(Value::Int32(5)));
        assert_eq!(get("json|Owner|mail"), Some(Value::from("a@x.io")));
        assert_eq!(get("json|Logo"), Some(Value::from("https://img/12")));
        assert_eq!(get("json|Logo|id"), Some(Value::Int32(12)));
        assert_eq!(get("json|Site"), Some(Value::from("https://acme.io")));
        assert_eq!(get("json|Site|title"), Some(Value::from("Acme")));
    }

    #[test]
    fn unknown_tag_uses_first_value() {
        assert_eq!(get("json|Notes"), Some(Value::from("hello")));
    }

    #[test]
    fn missing_values_are_absent() {
        assert_eq!(get("json|Empty"), None);
        assert_eq!(get("json|Missing"), None);
        assert_eq!(get("json|Nope"), None);
        assert_eq!(get("other|Amount"), None);
        assert_eq!(get("json"), None);
    }

    #[test]
    fn malformed_records_error() {
        let d = doc(json!({"json": [{"type": "money", "values": []}]}));
        let err = TaggedFieldDecoder::default()
            .try_extract(&ColumnPath::new("json|Amount"), &d)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn payload_as_json_text() {
        let text = r#"[{"label": "Amount", "type": "money", "values": [{"value": 3, "currency": "EUR"}]}]"#;
        let d = doc(json!({"json": text}));
        let decoder = TaggedFieldDecoder::default();
        assert_eq!(
            decoder
                .try_extract(&ColumnPath::new("json|Amount|currency"), &d)
                .unwrap(),
            Some(Value::from("EUR"))
        );
    }

    #[test]
    fn custom_payload_field() {
        let d = doc(json!({"fields": [{"label": "A", "type": "text", "values": [{"value": 1}]}]}));
        let decoder = TaggedFieldDecoder::new("fields");
        assert_eq!(
            decoder.try_extract(&ColumnPath::new("fields|A"), &d).unwrap(),
            Some(Value::Int32(1))
        );
    }

    #[test]
    fn discovery_hook_emits_columns() {
        let decoder = TaggedFieldDecoder::default();
        let document = item();
        let mut schema = Schema::new();
        let mut diagnostics = Diagnostics::new();
        decoder.discover(
            &mut schema,
            "json",
            document.get("json").unwrap(),
            &mut diagnostics,
        );

        let ty = |p: &str| schema.get(p).map(|c| c.column_type);
        assert_eq!(ty("json|Amount"), Some(SemanticType::Decimal));
        assert_eq!(ty("json|Amount|currency"), Some(SemanticType::String));
        assert_eq!(ty("json|Status"), Some(SemanticType::String));
        assert_eq!(ty("json|Status|id"), Some(SemanticType::Int64));
        assert_eq!(ty("json|Tags"), Some(SemanticType::StringArray));
        assert_eq!(ty("json|Tags|id"), Some(SemanticType::IntArray));
        assert_eq!(ty("json|Due"), Some(SemanticType::DateTime));
        assert_eq!(ty("json|Due|end_date"), Some(SemanticType::DateTime));
        assert_eq!(ty("json|Owner|id"), Some(SemanticType::Int64));
        assert_eq!(ty("json|Site|title"), Some(SemanticType::String));
        assert_eq!(ty("json|Notes"), Some(SemanticType::String));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn discovery_hook_skips_malformed_records() {
        let decoder = TaggedFieldDecoder::default();
        let payload = Value::from_json(json!([
            "junk",
            {"label": "Ok", "type": "text", "values": []}
        ]));
        let mut schema = Schema::new();
        let mut diagnostics = Diagnostics::new();
        decoder.discover(&mut schema, "json", &payload, &mut diagnostics);

        assert_eq!(schema.len(), 1);
        assert_eq!(diagnostics.messages().len(), 1);

        decoder.discover(&mut schema, "other", &payload, &mut diagnostics);
        assert_eq!(schema.len(), 1);
    }
}
