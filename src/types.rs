//! Core domain types for sanetree.

use std::collections::HashSet;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identity of a row in the tree table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl NodeId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        *id
    }
}

impl From<&Node> for NodeId {
    fn from(node: &Node) -> Self {
        node.id
    }
}

impl ToSql for NodeId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for NodeId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(NodeId)
    }
}

/// Collapse any mix of ids, raw integers, or node references into a
/// deduplicated id list, keeping first-seen order.
pub fn normalize_ids<I, T>(items: I) -> Vec<NodeId>
where
    I: IntoIterator<Item = T>,
    T: Into<NodeId>,
{
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut out: Vec<NodeId> = Vec::new();
    for id in items.into_iter().map(Into::into) {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One row of the tree table.
///
/// `fields` holds every column other than the identity, the parent
/// reference, and the computed traversal depth, in table column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, parent_id: Option<NodeId>) -> Self {
        Self {
            id: id.into(),
            parent_id,
            fields: serde_json::Map::new(),
        }
    }

    /// A node with no parent reference.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Look up an extra column by name.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Convenience accessor for text columns such as `name`.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// NodeWithDepth
// ---------------------------------------------------------------------------

/// A node annotated with its traversal depth relative to the query's start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithDepth {
    pub node: Node,
    pub depth: i64,
}

impl From<&NodeWithDepth> for NodeId {
    fn from(row: &NodeWithDepth) -> Self {
        row.node.id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_ids_dedups_and_keeps_order() {
        let ids = normalize_ids([3_i64, 1, 3, 2, 1]);
        assert_eq!(ids, vec![NodeId(3), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn normalize_ids_handles_large_lists() {
        let many = (0..50_000_i64).chain(0..50_000_i64);
        let ids = normalize_ids(many);
        assert_eq!(ids.len(), 50_000);
        assert_eq!(ids[0], NodeId(0));
        assert_eq!(ids[49_999], NodeId(49_999));
    }

    #[test]
    fn normalize_ids_accepts_node_refs() {
        let a = Node::new(10, None);
        let b = Node::new(11, Some(NodeId(10)));
        let ids = normalize_ids([&a, &b]);
        assert_eq!(ids, vec![NodeId(10), NodeId(11)]);
    }

    #[test]
    fn root_detection() {
        assert!(Node::new(1, None).is_root());
        assert!(!Node::new(2, Some(NodeId(1))).is_root());
    }

    #[test]
    fn node_serializes_fields_inline() {
        let mut node = Node::new(5, Some(NodeId(1)));
        node.fields.insert("name".into(), json!("leaf"));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value, json!({"id": 5, "parent_id": 1, "name": "leaf"}));
        assert_eq!(node.field_str("name"), Some("leaf"));
    }
}
