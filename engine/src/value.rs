//! Document value model.
//!
//! Documents are schema-less nested mappings. Every field holds a [`Value`]:
//! a scalar, a nested [`Document`], or an array of values. All extraction
//! logic pattern-matches on this enum.
//!
//! Values travel over the wire and into JSON storage as relaxed extended
//! JSON: plain JSON for strings, booleans, doubles and 32-bit integers, and
//! single-key `$`-wrappers for the store-native kinds (`$oid`, `$date`,
//! `$numberLong`, `$numberDecimal`, `$uuid`, `$timestamp`, `$binary`).

use crate::ObjectId;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::json;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// A single field value inside a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    /// Arbitrary-precision decimal, kept in its canonical text form
    Decimal(String),
    String(String),
    ObjectId(ObjectId),
    DateTime(DateTime<Utc>),
    /// Internal replication timestamp: seconds plus an ordinal within the second
    Timestamp { time: u32, increment: u32 },
    Uuid(Uuid),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    /// Check if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Integral view of numeric values. Doubles convert only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Short name of the value kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "date",
            Value::Timestamp { .. } => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    /// Render a document identifier as the row's stable string identifier.
    pub fn to_identifier_string(&self) -> String {
        self.to_string()
    }

    /// Total order over values, used to sort multi-valued fields.
    ///
    /// Numbers compare numerically across integer, double and decimal
    /// kinds; values of different kinds order by kind rank.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => return a.total_cmp(&b),
            (Some(_), None) | (None, Some(_)) => return self.rank().cmp(&other.rank()),
            (None, None) => {}
        }

        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::ObjectId(a), Value::ObjectId(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (
                Value::Timestamp {
                    time: t1,
                    increment: i1,
                },
                Value::Timestamp {
                    time: t2,
                    increment: i2,
                },
            ) => (t1, i1).cmp(&(t2, i2)),
            (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.compare(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Value::Document(a), Value::Document(b)) => {
                a.to_json().to_string().cmp(&b.to_json().to_string())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal(v) => v.parse().ok(),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal(_) => 1,
            Value::String(_) => 2,
            Value::Document(_) => 3,
            Value::Array(_) => 4,
            Value::Binary(_) => 5,
            Value::ObjectId(_) => 6,
            Value::Uuid(_) => 7,
            Value::Bool(_) => 8,
            Value::DateTime(_) => 9,
            Value::Timestamp { .. } => 10,
        }
    }

    /// Encode as relaxed extended JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int32(v) => json!(v),
            Value::Int64(v) if i32::try_from(*v).is_ok() => {
                json!({ "$numberLong": v.to_string() })
            }
            Value::Int64(v) => json!(v),
            Value::Double(v) => match serde_json::Number::from_f64(*v) {
                Some(n) => serde_json::Value::Number(n),
                None => json!({ "$numberDouble": non_finite_name(*v) }),
            },
            Value::Decimal(v) => json!({ "$numberDecimal": v }),
            Value::String(s) => json!(s),
            Value::ObjectId(id) => json!({ "$oid": id.to_string() }),
            Value::DateTime(dt) => {
                json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::Millis, true) })
            }
            Value::Timestamp { time, increment } => {
                json!({ "$timestamp": { "t": time, "i": increment } })
            }
            Value::Uuid(u) => json!({ "$uuid": u.to_string() }),
            Value::Binary(bytes) => json!({ "$binary": hex_encode(bytes) }),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Document(doc) => doc.to_json(),
        }
    }

    /// Decode relaxed extended JSON. Malformed `$`-wrappers decode as
    /// ordinary documents.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int32(small),
                        Err(_) => Value::Int64(i),
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some((key, inner)) = map.iter().next() {
                        if let Some(native) = decode_wrapper(key, inner) {
                            return native;
                        }
                    }
                }
                Value::Document(
                    map.into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

fn decode_wrapper(key: &str, inner: &serde_json::Value) -> Option<Value> {
    match key {
        "$oid" => inner
            .as_str()
            .and_then(|s| ObjectId::parse_str(s).ok())
            .map(Value::ObjectId),
        "$date" => match inner {
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            serde_json::Value::Number(n) => n.as_i64().and_then(millis_to_datetime),
            serde_json::Value::Object(o) => o
                .get("$numberLong")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(millis_to_datetime),
            _ => None,
        },
        "$numberLong" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::Int64),
        "$numberDecimal" => inner.as_str().map(|s| Value::Decimal(s.to_string())),
        "$numberDouble" => inner.as_str().and_then(|s| match s {
            "NaN" => Some(Value::Double(f64::NAN)),
            "Infinity" => Some(Value::Double(f64::INFINITY)),
            "-Infinity" => Some(Value::Double(f64::NEG_INFINITY)),
            other => other.parse().ok().map(Value::Double),
        }),
        "$uuid" => inner
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Value::Uuid),
        "$timestamp" => {
            let t = inner.get("t")?.as_u64()?;
            let i = inner.get("i")?.as_u64()?;
            Some(Value::Timestamp {
                time: u32::try_from(t).ok()?,
                increment: u32::try_from(i).ok()?,
            })
        }
        "$binary" => inner.as_str().and_then(hex_decode).map(Value::Binary),
        _ => None,
    }
}

fn millis_to_datetime(millis: i64) -> Option<Value> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(Value::DateTime)
}

fn non_finite_name(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(v) | Value::String(v) => f.write_str(v),
            Value::ObjectId(id) => write!(f, "{}", id),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Uuid(u) => write!(f, "{}", u),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::ObjectId(id)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// An insertion-ordered mapping of field names to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert a field. An existing field keeps its position and has its
    /// value replaced; the previous value is returned.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode as a relaxed extended JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Decode from extended JSON. Returns `None` unless the JSON is an object
    /// that is not itself a native-value wrapper.
    pub fn from_json(json: serde_json::Value) -> Option<Document> {
        match Value::from_json(json) {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Document::from_json(json).ok_or_else(|| serde::de::Error::custom("expected a document"))
    }
}
