//! Change sets.
//!
//! A change set is computed by the caller from a comparison of source and
//! target rows. Items are grouped by kind and processed add, update, delete.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Add => write!(f, "add"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// One pending add, update or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeItem {
    /// Candidate values keyed by column path. Adds carry every column;
    /// updates carry the changed columns only.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    /// Identifier of the targeted document, for updates and deletes
    #[serde(default)]
    pub target_id: Option<String>,
    /// Whether the item is applied; unsynced items are still processed
    #[serde(default = "default_true")]
    pub sync: bool,
    /// Pending-change marker, cleared once the item is processed
    #[serde(default = "default_true")]
    pub pending: bool,
    /// Identifier the store assigned to an added document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ChangeItem {
    fn new(values: BTreeMap<String, Value>, target_id: Option<String>) -> Self {
        Self {
            values,
            target_id,
            sync: true,
            pending: true,
            assigned_id: None,
        }
    }

    /// An item inserting a new document.
    pub fn add<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(collect_values(values), None)
    }

    /// An item setting changed columns on an existing document.
    pub fn update<I, K, V>(target_id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(collect_values(values), Some(target_id.into()))
    }

    /// An item removing a document.
    pub fn delete(target_id: impl Into<String>) -> Self {
        Self::new(BTreeMap::new(), Some(target_id.into()))
    }

    /// Builder-style method to set the sync flag.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Target identifier, or an empty string when none was given.
    pub fn target(&self) -> &str {
        self.target_id.as_deref().unwrap_or_default()
    }
}

fn collect_values<I, K, V>(values: I) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Items to apply, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    #[serde(default)]
    pub adds: Vec<ChangeItem>,
    #[serde(default)]
    pub updates: Vec<ChangeItem>,
    #[serde(default)]
    pub deletes: Vec<ChangeItem>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self, kind: ChangeKind) -> &[ChangeItem] {
        match kind {
            ChangeKind::Add => &self.adds,
            ChangeKind::Update => &self.updates,
            ChangeKind::Delete => &self.deletes,
        }
    }

    pub fn items_mut(&mut self, kind: ChangeKind) -> &mut Vec<ChangeItem> {
        match kind {
            ChangeKind::Add => &mut self.adds,
            ChangeKind::Update => &mut self.updates,
            ChangeKind::Delete => &mut self.deletes,
        }
    }

    /// Total number of items across all kinds.
    pub fn len(&self) -> usize {
        self.adds.len() + self.updates.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items still carrying a pending marker.
    pub fn pending(&self) -> usize {
        [&self.adds, &self.updates, &self.deletes]
            .iter()
            .flat_map(|items| items.iter())
            .filter(|item| item.pending)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors() {
        let add = ChangeItem::add([("name", "Alice")]);
        assert!(add.sync && add.pending);
        assert_eq!(add.target_id, None);
        assert_eq!(add.values.get("name"), Some(&Value::from("Alice")));

        let update = ChangeItem::update("abc", [("age", 31)]);
        assert_eq!(update.target(), "abc");

        let delete = ChangeItem::delete("abc").with_sync(false);
        assert!(!delete.sync);
        assert!(delete.values.is_empty());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ChangeKind::Add.to_string(), "add");
        assert_eq!(ChangeKind::Delete.to_string(), "delete");
    }

    #[test]
    fn change_set_counts() {
        let mut set = ChangeSet::new();
        assert!(set.is_empty());
        set.adds.push(ChangeItem::add([("a", 1)]));
        set.deletes.push(ChangeItem::delete("x"));
        set.deletes.push(ChangeItem::delete("y"));

        assert_eq!(set.len(), 3);
        assert_eq!(set.items(ChangeKind::Delete).len(), 2);
        set.items_mut(ChangeKind::Delete)[0].pending = false;
        assert_eq!(set.pending(), 2);
    }

    #[test]
    fn wire_format_defaults() {
        let set: ChangeSet = serde_json::from_value(json!({
            "adds": [{"values": {"name": "Alice", "owner|id": {"$numberLong": "5"}}}],
            "deletes": [{"targetId": "65f1c0a2e4b0a1b2c3d4e5f6", "sync": false}],
        }))
        .unwrap();

        assert_eq!(set.adds[0].values.get("owner|id"), Some(&Value::Int64(5)));
        assert!(set.adds[0].sync && set.adds[0].pending);
        assert!(set.updates.is_empty());
        assert!(!set.deletes[0].sync);

        let json = serde_json::to_value(&set.deletes[0]).unwrap();
        assert_eq!(json["targetId"], "65f1c0a2e4b0a1b2c3d4e5f6");
        assert!(json.get("assignedId").is_none());
    }
}
