//! Path addressing for nested document fields.
//!
//! A column's path is the sequence of nested field names joined with
//! [`PATH_DELIMITER`]. Segment names are not escaped: a field name that
//! itself contains the delimiter cannot be addressed.

use crate::{error::Result, Document, Error, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter between path segments.
pub const PATH_DELIMITER: char = '|';

/// Join segments into a flat column path.
pub fn join<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut path = String::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            path.push(PATH_DELIMITER);
        }
        path.push_str(segment.as_ref());
    }
    path
}

/// Split a column path into its segments.
pub fn split(path: &str) -> Vec<&str> {
    path.split(PATH_DELIMITER).collect()
}

/// Resolve a path against a document.
///
/// Returns `None` when any segment is missing, when an intermediate node
/// is not a document, or when the leaf is null.
pub fn resolve<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let (parent, leaf) = resolve_parent(document, path)?;
    match parent.get(leaf) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

/// Resolve the document containing the leaf of `path`, plus the leaf name.
///
/// Single-segment paths resolve to the root document itself.
pub fn resolve_parent<'a, 'p>(
    document: &'a Document,
    path: &'p str,
) -> Option<(&'a Document, &'p str)> {
    let mut segments = path.split(PATH_DELIMITER);
    let mut leaf = segments.next()?;
    let mut current = document;

    for next in segments {
        current = match current.get(leaf) {
            Some(Value::Document(child)) => child,
            _ => return None,
        };
        leaf = next;
    }

    Some((current, leaf))
}

/// Assign `value` at `path`, creating missing or null intermediate
/// documents. Fails when an intermediate node is a non-document value.
pub fn assign(document: &mut Document, path: &str, value: Value) -> Result<()> {
    assign_segments(document, &split(path), value)
}

fn assign_segments(document: &mut Document, segments: &[&str], value: Value) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(());
    };

    if rest.is_empty() {
        document.insert(*first, value);
        return Ok(());
    }

    if document.get(first).map_or(true, Value::is_null) {
        document.insert(*first, Document::new());
    }

    match document.get_mut(first) {
        Some(Value::Document(child)) => assign_segments(child, rest, value),
        other => Err(Error::MalformedDocument(format!(
            "cannot create field '{}' in element {{{}: {}}}",
            rest[0],
            first,
            other.map_or(serde_json::Value::Null, |v| v.to_json())
        ))),
    }
}

/// A column's location inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnPath(String);

impl ColumnPath {
    /// Wrap an already-joined path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Build a path from its segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(join(segments))
    }

    /// Extend this path with a child field name.
    pub fn child(&self, name: &str) -> Self {
        let mut path = self.0.clone();
        path.push(PATH_DELIMITER);
        path.push_str(name);
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        split(&self.0)
    }

    /// Number of segments in the path.
    pub fn depth(&self) -> usize {
        self.0.matches(PATH_DELIMITER).count() + 1
    }

    /// Name of the top-level field the path starts in.
    pub fn root(&self) -> &str {
        self.0.split(PATH_DELIMITER).next().unwrap_or_default()
    }

    /// The last segment.
    pub fn leaf(&self) -> &str {
        self.0.rsplit(PATH_DELIMITER).next().unwrap_or_default()
    }

    /// Dotted store-side field path (`a|b` becomes `a.b`).
    pub fn to_field_path(&self) -> String {
        self.0.replace(PATH_DELIMITER, ".")
    }

    pub fn resolve<'a>(&self, document: &'a Document) -> Option<&'a Value> {
        resolve(document, &self.0)
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ColumnPath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ColumnPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ColumnPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    #[test]
    fn join_and_split() {
        assert_eq!(join(["a", "b", "c"]), "a|b|c");
        assert_eq!(join(["solo"]), "solo");
        assert_eq!(split("a|b|c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn resolve_nested_leaf() {
        let d = doc(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(resolve(&d, "a|b"), Some(&Value::Int32(1)));
        assert_eq!(resolve(&d, "a|c"), Some(&Value::Int32(2)));
    }

    #[test]
    fn resolve_top_level_against_root() {
        let d = doc(json!({"name": "Alice"}));
        assert_eq!(resolve(&d, "name"), Some(&Value::from("Alice")));
        let (parent, leaf) = resolve_parent(&d, "name").unwrap();
        assert_eq!(parent, &d);
        assert_eq!(leaf, "name");
    }

    #[test]
    fn assign_creates_intermediates() {
        let mut d = doc(json!({"a": {"keep": 1}, "n": null}));
        assign(&mut d, "a|b|c", Value::Int32(2)).unwrap();
        assign(&mut d, "n|x", Value::from("y")).unwrap();
        assign(&mut d, "top", Value::Bool(true)).unwrap();

        assert_eq!(d.to_json(), json!({
            "a": {"keep": 1, "b": {"c": 2}},
            "n": {"x": "y"},
            "top": true,
        }));
    }

    #[test]
    fn assign_through_scalar_fails() {
        let mut d = doc(json!({"a": 5}));
        assert!(matches!(
            assign(&mut d, "a|b", Value::Int32(1)),
            Err(Error::MalformedDocument(_))
        ));
        assert_eq!(d.to_json(), json!({"a": 5}));
    }

    #[test]
    fn resolve_absent_cases() {
        let d = doc(json!({
            "scalar": 5,
            "list": [{"x": 1}],
            "nested": {"empty": null},
        }));

        assert_eq!(resolve(&d, "missing"), None);
        assert_eq!(resolve(&d, "scalar|x"), None);
        assert_eq!(resolve(&d, "list|x"), None);
        assert_eq!(resolve(&d, "nested|empty"), None);
        assert_eq!(resolve(&d, "nested|gone|deeper"), None);
    }

    #[test]
    fn column_path_accessors() {
        let path = ColumnPath::from("fields|Budget|currency");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.root(), "fields");
        assert_eq!(path.leaf(), "currency");
        assert_eq!(path.to_field_path(), "fields.Budget.currency");
        assert_eq!(ColumnPath::from("a").child("b").as_str(), "a|b");
    }

    proptest! {
        #[test]
        fn split_inverts_join(segments in prop::collection::vec("[a-zA-Z0-9_ ]{1,8}", 1..6)) {
            let joined = join(&segments);
            let parts: Vec<String> = split(&joined).into_iter().map(String::from).collect();
            prop_assert_eq!(parts, segments);
        }

        #[test]
        fn resolve_never_panics(path in "[a-c|]{0,12}") {
            let d = doc(json!({"a": {"b": {"c": 1}, "c": [1, 2]}, "b": "x", "c": null}));
            let _ = resolve(&d, &path);
        }

        #[test]
        fn built_nesting_resolves(segments in prop::collection::vec("[a-z]{1,6}", 1..5), leaf in any::<i32>()) {
            let mut value = Value::Int32(leaf);
            for segment in segments.iter().rev() {
                let mut d = Document::new();
                d.insert(segment.clone(), value);
                value = Value::Document(d);
            }
            let Value::Document(root) = value else { unreachable!() };
            prop_assert_eq!(resolve(&root, &join(&segments)), Some(&Value::Int32(leaf)));
        }
    }
}
