//! Row <-> domain conversions.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde_json::{Map, Number, Value};

use crate::config::TreeConfig;
use crate::types::{Node, NodeId, NodeWithDepth};

/// Name of the computed depth column every traversal query projects.
pub const DEPTH_COLUMN: &str = "tree_depth";

/// Map a row of the tree table (optionally carrying [`DEPTH_COLUMN`]) to a
/// [`Node`]. Columns other than the identity, the parent reference, and
/// the depth go into `fields` in statement column order.
pub fn row_to_node(row: &Row<'_>, config: &TreeConfig) -> rusqlite::Result<Node> {
    let stmt = row.as_ref();
    let mut id = None;
    let mut parent_id = None;
    let mut fields = Map::new();

    for (idx, name) in stmt.column_names().into_iter().enumerate() {
        if name == config.primary_key {
            id = Some(row.get::<_, NodeId>(idx)?);
        } else if name == config.foreign_key {
            parent_id = row.get::<_, Option<NodeId>>(idx)?;
        } else if name != DEPTH_COLUMN {
            fields.insert(name.to_string(), value_ref_to_json(row.get_ref(idx)?));
        }
    }

    let id = id.ok_or_else(|| rusqlite::Error::InvalidColumnName(config.primary_key.clone()))?;
    Ok(Node {
        id,
        parent_id,
        fields,
    })
}

/// Like [`row_to_node`] but also reads [`DEPTH_COLUMN`].
pub fn row_to_node_with_depth(
    row: &Row<'_>,
    config: &TreeConfig,
) -> rusqlite::Result<NodeWithDepth> {
    let node = row_to_node(row, config)?;
    let depth: i64 = row.get(DEPTH_COLUMN)?;
    Ok(NodeWithDepth { node, depth })
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Convert a JSON field value into something SQLite can bind.
///
/// Booleans become 0/1; arrays and objects are stored as JSON text.
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use serde_json::json;

    #[test]
    fn row_to_node_splits_key_columns() {
        let conn = Connection::open_in_memory().unwrap();
        let config = TreeConfig::default();
        let node = conn
            .query_row(
                "SELECT 4 AS id, 2 AS parent_id, 'leaf' AS name, 1.5 AS weight, NULL AS note, 3 AS tree_depth",
                [],
                |row| row_to_node_with_depth(row, &config),
            )
            .unwrap();
        assert_eq!(node.depth, 3);
        assert_eq!(node.node.id, NodeId(4));
        assert_eq!(node.node.parent_id, Some(NodeId(2)));
        assert_eq!(
            Value::Object(node.node.fields),
            json!({"name": "leaf", "weight": 1.5, "note": null})
        );
    }

    #[test]
    fn null_parent_is_root() {
        let conn = Connection::open_in_memory().unwrap();
        let config = TreeConfig::default();
        let node = conn
            .query_row("SELECT 1 AS id, NULL AS parent_id", [], |row| {
                row_to_node(row, &config)
            })
            .unwrap();
        assert!(node.is_root());
        assert!(node.fields.is_empty());
    }

    #[test]
    fn missing_identity_column_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        let config = TreeConfig::default();
        let res = conn.query_row("SELECT 1 AS parent_id", [], |row| row_to_node(row, &config));
        assert!(matches!(res, Err(rusqlite::Error::InvalidColumnName(_))));
    }

    #[test]
    fn json_to_sql_conversions() {
        assert_eq!(json_to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(12)), SqlValue::Integer(12));
        assert_eq!(json_to_sql(&json!(0.25)), SqlValue::Real(0.25));
        assert_eq!(json_to_sql(&json!("x")), SqlValue::Text("x".into()));
        assert_eq!(json_to_sql(&json!([1, 2])), SqlValue::Text("[1,2]".into()));
    }
}
