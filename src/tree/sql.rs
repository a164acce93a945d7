//! SQL text for every tree query, rendered once per [`TreeConfig`].
//!
//! Table and column names are spliced in at construction (they were
//! validated as plain identifiers); everything else is bound as a
//! parameter. Queries over a caller-supplied id list are rendered per call
//! with numbered placeholders because their arity varies.

use crate::config::schema::quote_identifier;
use crate::config::TreeConfig;
use crate::db::converters::DEPTH_COLUMN;

/// Pre-rendered statements for one tree table.
#[derive(Debug, Clone)]
pub struct TreeQueries {
    table: String,
    pk: String,
    fk: String,
    order: String,

    /// `?1` node id, `?2` depth ceiling.
    pub ancestors: String,
    /// `?1` node id, `?2` depth ceiling. Yields `MAX(tree_depth)` or NULL.
    pub depth: String,
    /// `?1` node id.
    pub get: String,
    /// `?1` node id.
    pub parent: String,
    /// `?1` parent id.
    pub children: String,
    pub roots: String,
    pub first_root: String,
    /// `?1` node id.
    pub self_and_siblings: String,
    /// `?1` node id.
    pub siblings: String,
    /// `?1` node id. Yields one boolean row when the node exists.
    pub is_root: String,
    pub count: String,
    /// `?1` node id, `?2` parent id or NULL.
    pub set_parent: String,
    /// `?1` node id. Walks the whole subtree; `UNION` keeps it finite
    /// even on cyclic data, so no depth ceiling applies.
    pub delete_subtree: String,
    /// `?1` parent id.
    pub detach_children: String,
    /// `?1` node id.
    pub delete_one: String,
}

impl TreeQueries {
    pub fn new(config: &TreeConfig) -> Self {
        let t = quote_identifier(&config.table);
        let pk = quote_identifier(&config.primary_key);
        let fk = quote_identifier(&config.foreign_key);
        let order = config.order_clause();
        let d = DEPTH_COLUMN;

        let ancestors = format!(
            "\
WITH RECURSIVE crumbs AS (
    SELECT t.*, 0 AS {d} FROM {t} t WHERE t.{pk} = ?1
    UNION ALL
    SELECT p.*, c.{d} + 1 FROM crumbs c
    JOIN {t} p ON p.{pk} = c.{fk}
    WHERE c.{d} + 1 < ?2
)
SELECT * FROM crumbs WHERE {d} > 0 ORDER BY {d} DESC"
        );

        let depth = format!(
            "\
WITH RECURSIVE crumbs(up, {d}) AS (
    SELECT {fk}, 0 FROM {t} WHERE {pk} = ?1
    UNION ALL
    SELECT p.{fk}, c.{d} + 1 FROM crumbs c
    JOIN {t} p ON p.{pk} = c.up
    WHERE c.{d} + 1 < ?2
)
SELECT MAX({d}) FROM crumbs"
        );

        let subtree_cte = format!(
            "\
WITH RECURSIVE doomed(node) AS (
    SELECT {pk} FROM {t} WHERE {pk} = ?1
    UNION
    SELECT child.{pk} FROM doomed c
    JOIN {t} child ON child.{fk} = c.node
)"
        );

        let same_parent = format!(
            "{fk} IS (SELECT {fk} FROM {t} WHERE {pk} = ?1) \
             AND EXISTS (SELECT 1 FROM {t} WHERE {pk} = ?1)"
        );

        Self {
            ancestors,
            depth,
            get: format!("SELECT * FROM {t} WHERE {pk} = ?1"),
            parent: format!(
                "SELECT * FROM {t} WHERE {pk} = (SELECT {fk} FROM {t} WHERE {pk} = ?1)"
            ),
            children: format!("SELECT * FROM {t} WHERE {fk} = ?1 ORDER BY {order}"),
            roots: format!("SELECT * FROM {t} WHERE {fk} IS NULL ORDER BY {order}"),
            first_root: format!("SELECT * FROM {t} WHERE {fk} IS NULL ORDER BY {order} LIMIT 1"),
            self_and_siblings: format!("SELECT * FROM {t} WHERE {same_parent} ORDER BY {order}"),
            siblings: format!(
                "SELECT * FROM {t} WHERE {same_parent} AND {pk} <> ?1 ORDER BY {order}"
            ),
            is_root: format!("SELECT {fk} IS NULL FROM {t} WHERE {pk} = ?1"),
            count: format!("SELECT COUNT(*) FROM {t}"),
            set_parent: format!("UPDATE {t} SET {fk} = ?2 WHERE {pk} = ?1"),
            delete_subtree: format!(
                "{subtree_cte}\nDELETE FROM {t} WHERE {pk} IN (SELECT node FROM doomed)"
            ),
            detach_children: format!("UPDATE {t} SET {fk} = NULL WHERE {fk} = ?1"),
            delete_one: format!("DELETE FROM {t} WHERE {pk} = ?1"),
            table: t,
            pk,
            fk,
            order,
        }
    }

    /// Flat descendant listing.
    ///
    /// Binds `?1` seed depth, `?2` expansion ceiling, `?3`/`?4` inclusive
    /// depth window, then `seed_count` ids from `?5`. With no seed ids the
    /// traversal starts from every root.
    pub fn descendants(&self, seed_count: usize) -> String {
        let (t, pk, fk, d) = (&self.table, &self.pk, &self.fk, DEPTH_COLUMN);
        let seed = if seed_count == 0 {
            format!("t.{fk} IS NULL")
        } else {
            format!("t.{pk} IN ({})", placeholders(5, seed_count))
        };
        format!(
            "\
WITH RECURSIVE crumbs AS (
    SELECT t.*, ?1 AS {d} FROM {t} t WHERE {seed}
    UNION ALL
    SELECT child.*, c.{d} + 1 FROM crumbs c
    JOIN {t} child ON child.{fk} = c.{pk}
    WHERE c.{d} + 1 < ?2
)
SELECT * FROM crumbs
WHERE {d} >= ?3 AND {d} <= ?4
ORDER BY {d} ASC, {fk} ASC, {order}",
            order = self.order
        )
    }

    /// Closure of `src_count` ids from `?2` (bounded by `?1`) intersected
    /// with `chk_count` ids that follow them; returns full rows.
    pub fn nodes_within(&self, src_count: usize, chk_count: usize) -> String {
        format!(
            "{}\nSELECT * FROM {} WHERE {pk} IN (SELECT node FROM reach) AND {pk} IN ({}) ORDER BY {}",
            self.reach_cte(src_count),
            self.table,
            placeholders(2 + src_count, chk_count),
            self.order,
            pk = self.pk,
        )
    }

    /// Same binding as [`Self::nodes_within`]; yields a single boolean.
    pub fn is_within(&self, src_count: usize, chk_count: usize) -> String {
        format!(
            "{}\nSELECT EXISTS (SELECT 1 FROM reach WHERE node IN ({}))",
            self.reach_cte(src_count),
            placeholders(2 + src_count, chk_count),
        )
    }

    /// Given ids plus all their ancestors, minus `except_count` ids.
    ///
    /// Binds `?1` depth ceiling, `node_count` ids from `?2`, then the
    /// excluded ids.
    pub fn ancestors_with_nodes(&self, node_count: usize, except_count: usize) -> String {
        let (t, pk, fk, d) = (&self.table, &self.pk, &self.fk, DEPTH_COLUMN);
        let except = if except_count == 0 {
            String::new()
        } else {
            format!(
                " AND {pk} NOT IN ({})",
                placeholders(2 + node_count, except_count)
            )
        };
        format!(
            "\
WITH RECURSIVE crumbs(node, up, {d}) AS (
    SELECT {pk}, {fk}, 0 FROM {t} WHERE {pk} IN ({ids})
    UNION ALL
    SELECT p.{pk}, p.{fk}, c.{d} + 1 FROM crumbs c
    JOIN {t} p ON p.{pk} = c.up
    WHERE c.{d} + 1 < ?1
)
SELECT * FROM {t} WHERE {pk} IN (SELECT node FROM crumbs){except} ORDER BY {order}",
            ids = placeholders(2, node_count),
            order = self.order
        )
    }

    /// `INSERT` for the given column names (already validated).
    pub fn insert(&self, columns: &[&str]) -> String {
        let cols: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            cols.join(", "),
            placeholders(1, columns.len())
        )
    }

    fn reach_cte(&self, src_count: usize) -> String {
        let (t, pk, fk, d) = (&self.table, &self.pk, &self.fk, DEPTH_COLUMN);
        format!(
            "\
WITH RECURSIVE reach(node, {d}) AS (
    SELECT {pk}, 0 FROM {t} WHERE {pk} IN ({ids})
    UNION ALL
    SELECT child.{pk}, c.{d} + 1 FROM reach c
    JOIN {t} child ON child.{fk} = c.node
    WHERE c.{d} + 1 < ?1
)",
            ids = placeholders(2, src_count)
        )
    }
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered() {
        assert_eq!(placeholders(5, 3), "?5, ?6, ?7");
        assert_eq!(placeholders(1, 1), "?1");
        assert_eq!(placeholders(2, 0), "");
    }

    #[test]
    fn names_are_quoted_into_queries() {
        let q = TreeQueries::new(&TreeConfig::for_table("folders").with_foreign_key("folder_id"));
        assert!(q.children.contains("FROM \"folders\" WHERE \"folder_id\" = ?1"));
        assert!(q.ancestors.contains("JOIN \"folders\" p ON p.\"id\" = c.\"folder_id\""));
    }

    #[test]
    fn descendants_seed_switches_on_id_count() {
        let q = TreeQueries::new(&TreeConfig::default());
        assert!(q.descendants(0).contains("t.\"parent_id\" IS NULL"));
        assert!(q.descendants(2).contains("t.\"id\" IN (?5, ?6)"));
    }

    #[test]
    fn containment_placeholders_follow_sources() {
        let q = TreeQueries::new(&TreeConfig::default());
        let sql = q.is_within(2, 3);
        assert!(sql.contains("IN (?2, ?3)"));
        assert!(sql.contains("node IN (?4, ?5, ?6)"));
    }

    #[test]
    fn except_clause_only_when_needed() {
        let q = TreeQueries::new(&TreeConfig::default());
        assert!(!q.ancestors_with_nodes(2, 0).contains("NOT IN"));
        assert!(q.ancestors_with_nodes(2, 1).contains("NOT IN (?4)"));
    }

    #[test]
    fn sibling_order_is_applied() {
        let q = TreeQueries::new(&TreeConfig::default().with_order("name"));
        assert!(q.roots.ends_with("ORDER BY name, \"id\""));
        assert!(q.descendants(1).ends_with("ORDER BY tree_depth ASC, \"parent_id\" ASC, name, \"id\""));
    }
}
