//! SQLite-backed tree store.
//!
//! A [`TreeStore`] is built once per [`TreeConfig`]: configuration is
//! validated and every fixed statement rendered up front, then all queries
//! go through [`Connection::prepare_cached`].

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::config::schema::validate_identifier;
use crate::config::TreeConfig;
use crate::db::converters::{json_to_sql, row_to_node};
use crate::db::schema::{create_tree_table, open_database};
use crate::error::{Result, TreeError};
use crate::tree::sql::TreeQueries;
use crate::types::{Node, NodeId};

// ---------------------------------------------------------------------------
// TreeStore
// ---------------------------------------------------------------------------

/// One tree table plus the connection it lives on.
pub struct TreeStore {
    pub conn: Connection,
    config: TreeConfig,
    queries: TreeQueries,
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore")
            .field("table", &self.config.table)
            .finish_non_exhaustive()
    }
}

impl TreeStore {
    /// Wrap an existing connection whose table already exists.
    pub fn new(conn: Connection, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let queries = TreeQueries::new(&config);
        Ok(Self {
            conn,
            config,
            queries,
        })
    }

    /// Open `db_path`, create the table if needed, and wrap it.
    pub fn open(db_path: &str, config: TreeConfig, extra_columns: &[(&str, &str)]) -> Result<Self> {
        let conn = open_database(db_path)?;
        create_tree_table(&conn, &config, extra_columns)?;
        Self::new(conn, config)
    }

    /// In-memory store, mostly for tests and scratch work.
    pub fn in_memory(config: TreeConfig, extra_columns: &[(&str, &str)]) -> Result<Self> {
        Self::open(":memory:", config, extra_columns)
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub(crate) fn queries(&self) -> &TreeQueries {
        &self.queries
    }

    /// Depth ceiling as a bindable integer.
    pub(crate) fn max_depth(&self) -> i64 {
        i64::from(self.config.max_depth)
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Insert a row under `parent` (or as a root) and return it.
    ///
    /// `fields` maps extra column names to values. An explicit identity may
    /// be supplied through the primary key column; the parent column must
    /// not appear in `fields`.
    pub fn insert_node(&self, parent: Option<NodeId>, fields: &Map<String, Value>) -> Result<Node> {
        let pk = self.config.primary_key.as_str();
        let fk = self.config.foreign_key.as_str();

        if fields.contains_key(fk) {
            return Err(TreeError::InvalidConfig(format!(
                "pass the parent as an argument, not as field {fk:?}"
            )));
        }
        if let (Some(parent), Some(explicit)) = (parent, fields.get(pk).and_then(Value::as_i64)) {
            if parent.get() == explicit {
                tracing::warn!(id = explicit, "rejected insert of self-parented node");
                return Err(TreeError::OwnParent { id: parent });
            }
        }

        let mut columns: Vec<&str> = vec![fk];
        let mut values: Vec<SqlValue> = vec![parent.map_or(SqlValue::Null, |p| SqlValue::Integer(p.get()))];
        for (name, value) in fields {
            validate_identifier(name)?;
            columns.push(name);
            values.push(json_to_sql(value));
        }

        let sql = self.queries.insert(&columns);
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(values.iter()))?;
        let id = NodeId(self.conn.last_insert_rowid());
        tracing::debug!(%id, parent = ?parent, table = %self.config.table, "inserted node");

        self.get_node(id)?
            .ok_or(TreeError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Re-parent `id`. Returns whether a row was updated.
    ///
    /// Setting a node as its own parent is rejected before the store is
    /// touched. Longer cycles are not detected.
    pub fn set_parent(&self, id: NodeId, parent: Option<NodeId>) -> Result<bool> {
        if parent == Some(id) {
            tracing::warn!(%id, "rejected self-parent update");
            return Err(TreeError::OwnParent { id });
        }
        let changed = self
            .conn
            .prepare_cached(&self.queries.set_parent)?
            .execute(params![id, parent])?;
        tracing::debug!(%id, parent = ?parent, changed, "set parent");
        Ok(changed > 0)
    }

    /// Delete `id`. With `cascade_on_delete` the whole subtree goes too,
    /// however deep; otherwise its children become roots. Returns rows
    /// removed, including any the table's own `ON DELETE CASCADE` took.
    pub fn delete_node(&self, id: NodeId) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let before = self.node_count()?;
        if self.config.cascade_on_delete {
            tx.prepare_cached(&self.queries.delete_subtree)?
                .execute(params![id])?;
        } else {
            tx.prepare_cached(&self.queries.detach_children)?
                .execute(params![id])?;
            tx.prepare_cached(&self.queries.delete_one)?
                .execute(params![id])?;
        }
        let removed = before.saturating_sub(self.node_count()?);
        tx.commit()?;
        tracing::debug!(%id, removed, cascade = self.config.cascade_on_delete, "deleted node");
        Ok(removed)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        self.query_optional(&self.queries.get, id)
    }

    /// Parent row of `id`; `None` for roots and unknown ids.
    pub fn parent(&self, id: NodeId) -> Result<Option<Node>> {
        self.query_optional(&self.queries.parent, id)
    }

    /// Direct children of `id` in sibling order.
    pub fn children(&self, id: NodeId) -> Result<Vec<Node>> {
        self.query_nodes(&self.queries.children, params![id])
    }

    pub fn node_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .prepare_cached(&self.queries.count)?
            .query_row([], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub(crate) fn query_optional(&self, sql: &str, id: NodeId) -> Result<Option<Node>> {
        let config = &self.config;
        let node = self
            .conn
            .prepare_cached(sql)?
            .query_row(params![id], |row| row_to_node(row, config))
            .optional()?;
        Ok(node)
    }

    pub(crate) fn query_nodes<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Node>> {
        let config = &self.config;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| row_to_node(row, config))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup(config: TreeConfig) -> TreeStore {
        TreeStore::in_memory(config, &[("name", "TEXT")]).expect("in-memory store")
    }

    fn named(name: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(name));
        fields
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = setup(TreeConfig::default());
        let root = store.insert_node(None, &named("root")).unwrap();
        let child = store.insert_node(Some(root.id), &named("child")).unwrap();

        assert!(root.is_root());
        assert_eq!(child.parent_id, Some(root.id));
        assert_eq!(child.field_str("name"), Some("child"));
        assert_eq!(store.get_node(child.id).unwrap(), Some(child));
        assert_eq!(store.node_count().unwrap(), 2);
    }

    #[test]
    fn get_unknown_is_none() {
        let store = setup(TreeConfig::default());
        assert_eq!(store.get_node(NodeId(404)).unwrap(), None);
        assert_eq!(store.parent(NodeId(404)).unwrap(), None);
        assert!(store.children(NodeId(404)).unwrap().is_empty());
    }

    #[test]
    fn explicit_identity_is_honoured() {
        let store = setup(TreeConfig::default());
        let mut fields = named("fixed");
        fields.insert("id".into(), json!(42));
        let node = store.insert_node(None, &fields).unwrap();
        assert_eq!(node.id, NodeId(42));
    }

    #[test]
    fn self_parent_rejected_on_update() {
        let store = setup(TreeConfig::default());
        let node = store.insert_node(None, &named("solo")).unwrap();
        let err = store.set_parent(node.id, Some(node.id)).unwrap_err();
        assert!(matches!(err, TreeError::OwnParent { id } if id == node.id));
        assert!(store.get_node(node.id).unwrap().unwrap().is_root());
    }

    #[test]
    fn self_parent_rejected_on_insert() {
        let store = setup(TreeConfig::default());
        store.insert_node(None, &named("first")).unwrap();
        let mut fields = named("loop");
        fields.insert("id".into(), json!(1));
        let err = store.insert_node(Some(NodeId(1)), &fields).unwrap_err();
        assert!(matches!(err, TreeError::OwnParent { .. }));
    }

    #[test]
    fn parent_column_in_fields_rejected() {
        let store = setup(TreeConfig::default());
        let mut fields = named("x");
        fields.insert("parent_id".into(), json!(1));
        assert!(matches!(
            store.insert_node(None, &fields),
            Err(TreeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn reparenting_moves_node() {
        let store = setup(TreeConfig::default());
        let a = store.insert_node(None, &named("a")).unwrap();
        let b = store.insert_node(None, &named("b")).unwrap();
        let c = store.insert_node(Some(a.id), &named("c")).unwrap();

        assert!(store.set_parent(c.id, Some(b.id)).unwrap());
        assert!(store.children(a.id).unwrap().is_empty());
        assert_eq!(store.children(b.id).unwrap()[0].id, c.id);
        assert_eq!(store.parent(c.id).unwrap().unwrap().id, b.id);

        assert!(!store.set_parent(NodeId(999), None).unwrap());
    }

    #[test]
    fn cascade_delete_removes_subtree() {
        let store = setup(TreeConfig::default());
        let root = store.insert_node(None, &named("root")).unwrap();
        let child = store.insert_node(Some(root.id), &named("child")).unwrap();
        store.insert_node(Some(child.id), &named("grandchild")).unwrap();
        let other = store.insert_node(None, &named("other")).unwrap();

        assert_eq!(store.delete_node(root.id).unwrap(), 3);
        assert_eq!(store.node_count().unwrap(), 1);
        assert!(store.get_node(other.id).unwrap().is_some());
    }

    #[test]
    fn cascade_delete_counts_rows_below_max_depth() {
        let store = setup(TreeConfig::default().with_max_depth(2));
        let mut parent = None;
        let mut chain = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let node = store.insert_node(parent, &named(name)).unwrap();
            parent = Some(node.id);
            chain.push(node.id);
        }

        assert_eq!(store.delete_node(chain[0]).unwrap(), 4);
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn cascade_delete_without_fk_cascade_leaves_no_orphans() {
        let conn = open_database(":memory:").unwrap();
        conn.execute_batch(
            "CREATE TABLE nodes (id INTEGER PRIMARY KEY, parent_id INTEGER, name TEXT)",
        )
        .unwrap();
        let store = TreeStore::new(conn, TreeConfig::default().with_max_depth(2)).unwrap();
        let mut parent = None;
        let mut chain = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            let node = store.insert_node(parent, &named(name)).unwrap();
            parent = Some(node.id);
            chain.push(node.id);
        }
        let other = store.insert_node(None, &named("other")).unwrap();

        assert_eq!(store.delete_node(chain[1]).unwrap(), 4);
        assert_eq!(store.node_count().unwrap(), 2);
        assert!(store.get_node(chain[4]).unwrap().is_none());
        assert!(store.get_node(other.id).unwrap().is_some());
    }

    #[test]
    fn non_cascading_delete_reroots_children() {
        let store = setup(TreeConfig::default().with_cascade_on_delete(false));
        let root = store.insert_node(None, &named("root")).unwrap();
        let child = store.insert_node(Some(root.id), &named("child")).unwrap();
        let grandchild = store.insert_node(Some(child.id), &named("grandchild")).unwrap();

        assert_eq!(store.delete_node(root.id).unwrap(), 1);
        assert!(store.get_node(child.id).unwrap().unwrap().is_root());
        assert_eq!(
            store.get_node(grandchild.id).unwrap().unwrap().parent_id,
            Some(child.id)
        );
    }

    #[test]
    fn delete_unknown_removes_nothing() {
        let store = setup(TreeConfig::default());
        assert_eq!(store.delete_node(NodeId(1)).unwrap(), 0);
    }

    #[test]
    fn children_follow_configured_order() {
        let store = setup(TreeConfig::default().with_order("name DESC"));
        let root = store.insert_node(None, &named("root")).unwrap();
        for name in ["b", "c", "a"] {
            store.insert_node(Some(root.id), &named(name)).unwrap();
        }
        let names: Vec<String> = store
            .children(root.id)
            .unwrap()
            .iter()
            .filter_map(|n| n.field_str("name").map(String::from))
            .collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let conn = Connection::open_in_memory().unwrap();
        let err = TreeStore::new(conn, TreeConfig::for_table("bad table")).unwrap_err();
        assert!(matches!(err, TreeError::InvalidIdentifier(_)));
    }
}
