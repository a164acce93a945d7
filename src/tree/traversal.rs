//! Tree traversal using SQLite recursive CTEs.
//!
//! Every walk carries a depth column and stops at the configured
//! `max_depth`, so corrupt (cyclic) data truncates instead of looping.
//! Nothing here treats a missing node as an error: unknown ids produce
//! empty lists, `None`, or `false`.

use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension};

use crate::db::converters::row_to_node_with_depth;
use crate::error::Result;
use crate::tree::materialize::{materialize, Forest};
use crate::tree::store::TreeStore;
use crate::types::{normalize_ids, Node, NodeId, NodeWithDepth};

// ---------------------------------------------------------------------------
// Options and result types
// ---------------------------------------------------------------------------

/// Knobs for descendant queries.
///
/// Depths are counted on the row scale: start nodes sit at 0 when included,
/// otherwise at -1 so their children report 0. `to_depth = n` keeps rows
/// whose depth is strictly below `n` and stops expanding there. `at_depth`
/// counts hops below the start nodes, keeps exactly that hop, and wins when
/// both are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescendantOptions {
    pub include_self: bool,
    pub raw: bool,
    pub to_depth: Option<u32>,
    pub at_depth: Option<u32>,
}

impl Default for DescendantOptions {
    fn default() -> Self {
        Self {
            include_self: true,
            raw: false,
            to_depth: None,
            at_depth: None,
        }
    }
}

impl DescendantOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the flat listing instead of a nested [`Forest`].
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Leave the start nodes out of the result.
    pub fn no_self(mut self) -> Self {
        self.include_self = false;
        self
    }

    pub fn to_depth(mut self, depth: u32) -> Self {
        self.to_depth = Some(depth);
        self
    }

    pub fn at_depth(mut self, depth: u32) -> Self {
        self.at_depth = Some(depth);
        self
    }
}

/// Output of [`TreeTraversal::nodes_and_descendants`].
#[derive(Debug, Clone, PartialEq)]
pub enum DescendantResult {
    Flat(Vec<NodeWithDepth>),
    Nested(Forest),
}

impl DescendantResult {
    pub fn into_flat(self) -> Option<Vec<NodeWithDepth>> {
        match self {
            Self::Flat(rows) => Some(rows),
            Self::Nested(_) => None,
        }
    }

    pub fn into_forest(self) -> Option<Forest> {
        match self {
            Self::Flat(_) => None,
            Self::Nested(forest) => Some(forest),
        }
    }

    /// Nodes in the result, counted across all levels.
    pub fn total_nodes(&self) -> usize {
        match self {
            Self::Flat(rows) => rows.len(),
            Self::Nested(forest) => forest.total_nodes(),
        }
    }
}

/// Bound parameters for the descendant CTE, in the row-depth scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DepthWindow {
    /// Depth assigned to the start rows.
    seed: i64,
    /// A row at depth `d` is expanded only while `d + 1 < ceiling`.
    ceiling: i64,
    /// Inclusive range of depths that survive the post-filter.
    lo: i64,
    hi: i64,
}

impl DepthWindow {
    fn new(options: &DescendantOptions, max_depth: i64) -> Self {
        let offset = if options.include_self { 0 } else { 1 };
        let mut window = Self {
            seed: -offset,
            ceiling: max_depth,
            lo: 0,
            hi: i64::MAX,
        };
        if let Some(hops) = options.at_depth.map(i64::from) {
            let last = hops - offset;
            window.ceiling = window.ceiling.min(last + 1);
            window.lo = last.max(0);
            window.hi = last;
        } else if let Some(bound) = options.to_depth.map(i64::from) {
            // rows strictly below the bound, counted on the row scale
            window.ceiling = window.ceiling.min(bound);
            window.hi = bound - 1;
        }
        window
    }
}

// ---------------------------------------------------------------------------
// TreeTraversal
// ---------------------------------------------------------------------------

/// Tree queries bound to one [`TreeStore`].
#[derive(Debug, Clone, Copy)]
pub struct TreeTraversal<'a> {
    store: &'a TreeStore,
}

impl<'a> TreeTraversal<'a> {
    pub fn new(store: &'a TreeStore) -> Self {
        Self { store }
    }

    /// Operations on a single node.
    pub fn node(&self, id: impl Into<NodeId>) -> NodeScope<'a> {
        NodeScope {
            traversal: *self,
            id: id.into(),
        }
    }

    // -------------------------------------------------------------------
    // Ancestry
    // -------------------------------------------------------------------

    /// Ancestors of `id` from the root down to the direct parent. The node
    /// itself is never included.
    pub fn ancestors(&self, id: impl Into<NodeId>) -> Result<Vec<Node>> {
        let id: NodeId = id.into();
        let store = self.store;
        let config = store.config();
        let mut stmt = store.conn.prepare_cached(&store.queries().ancestors)?;
        let rows = stmt.query_map(params![id, store.max_depth()], |row| {
            row_to_node_with_depth(row, config).map(|r| r.node)
        })?;
        let ancestors = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::debug!(%id, count = ancestors.len(), "ancestors");
        Ok(ancestors)
    }

    /// First element of [`Self::ancestors`].
    ///
    /// A node that is already a root has no ancestors, so this returns
    /// `None` for it rather than the node itself.
    pub fn root(&self, id: impl Into<NodeId>) -> Result<Option<Node>> {
        Ok(self.ancestors(id)?.into_iter().next())
    }

    /// Hops from `id` up to its root; 0 for a root, `None` for an unknown id.
    pub fn depth(&self, id: impl Into<NodeId>) -> Result<Option<u32>> {
        let id: NodeId = id.into();
        let store = self.store;
        let depth: Option<i64> = store
            .conn
            .prepare_cached(&store.queries().depth)?
            .query_row(params![id, store.max_depth()], |row| row.get(0))?;
        Ok(depth.and_then(|d| u32::try_from(d).ok()))
    }

    /// Whether `id` has no parent. Unknown ids are not roots.
    pub fn is_root(&self, id: impl Into<NodeId>) -> Result<bool> {
        let id: NodeId = id.into();
        let store = self.store;
        let root: Option<bool> = store
            .conn
            .prepare_cached(&store.queries().is_root)?
            .query_row(params![id], |row| row.get(0))
            .optional()?;
        Ok(root.unwrap_or(false))
    }

    /// The given nodes plus all their ancestors, without the `except` ids.
    pub fn ancestors_with_nodes<I, T, E, U>(&self, nodes: I, except: E) -> Result<Vec<Node>>
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
        E: IntoIterator<Item = U>,
        U: Into<NodeId>,
    {
        let nodes = normalize_ids(nodes);
        let except = normalize_ids(except);
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store;
        let sql = store.queries().ancestors_with_nodes(nodes.len(), except.len());
        let max_depth = store.max_depth();
        let mut bind: Vec<&dyn ToSql> = Vec::with_capacity(1 + nodes.len() + except.len());
        bind.push(&max_depth);
        bind.extend(nodes.iter().map(|id| id as &dyn ToSql));
        bind.extend(except.iter().map(|id| id as &dyn ToSql));
        store.query_nodes(&sql, bind.as_slice())
    }

    // -------------------------------------------------------------------
    // Roots and siblings
    // -------------------------------------------------------------------

    /// All root nodes in sibling order.
    pub fn roots(&self) -> Result<Vec<Node>> {
        self.store.query_nodes(&self.store.queries().roots, [])
    }

    pub fn first_root(&self) -> Result<Option<Node>> {
        let mut roots = self
            .store
            .query_nodes(&self.store.queries().first_root, [])?;
        Ok(roots.pop())
    }

    /// Nodes sharing `id`'s parent (all roots when `id` is a root),
    /// including `id` itself.
    pub fn self_and_siblings(&self, id: impl Into<NodeId>) -> Result<Vec<Node>> {
        let id: NodeId = id.into();
        self.store
            .query_nodes(&self.store.queries().self_and_siblings, params![id])
    }

    /// [`Self::self_and_siblings`] without `id`.
    pub fn siblings(&self, id: impl Into<NodeId>) -> Result<Vec<Node>> {
        let id: NodeId = id.into();
        self.store
            .query_nodes(&self.store.queries().siblings, params![id])
    }

    // -------------------------------------------------------------------
    // Descendants
    // -------------------------------------------------------------------

    /// Descendants of the given start nodes, or of every root when none
    /// are given.
    ///
    /// Rows come back ordered by depth, then parent, then sibling order,
    /// which is the order [`materialize`] needs. Start ids that do not
    /// exist simply contribute nothing.
    pub fn nodes_and_descendants<I, T>(
        &self,
        start: I,
        options: DescendantOptions,
    ) -> Result<DescendantResult>
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        let rows = self.collect_descendants(&normalize_ids(start), &options)?;
        if options.raw {
            Ok(DescendantResult::Flat(rows))
        } else {
            Ok(DescendantResult::Nested(materialize(
                rows.into_iter().map(|r| r.node),
            )))
        }
    }

    /// Descendants of one node, never including the node itself.
    pub fn descendants(
        &self,
        id: impl Into<NodeId>,
        options: DescendantOptions,
    ) -> Result<DescendantResult> {
        let id: NodeId = id.into();
        self.nodes_and_descendants([id], options.no_self())
    }

    /// Flat, depth-annotated descendants of one node.
    pub fn descendants_flat(
        &self,
        id: impl Into<NodeId>,
        options: DescendantOptions,
    ) -> Result<Vec<NodeWithDepth>> {
        let id: NodeId = id.into();
        self.collect_descendants(&[id], &options.no_self())
    }

    /// Nested descendants of one node.
    pub fn descendants_tree(
        &self,
        id: impl Into<NodeId>,
        options: DescendantOptions,
    ) -> Result<Forest> {
        let id: NodeId = id.into();
        let rows = self.collect_descendants(&[id], &options.no_self())?;
        Ok(materialize(rows.into_iter().map(|r| r.node)))
    }

    fn collect_descendants(
        &self,
        start: &[NodeId],
        options: &DescendantOptions,
    ) -> Result<Vec<NodeWithDepth>> {
        let store = self.store;
        let window = DepthWindow::new(options, store.max_depth());
        if window.lo > window.hi {
            return Ok(Vec::new());
        }

        let sql = store.queries().descendants(start.len());
        let mut bind: Vec<&dyn ToSql> = Vec::with_capacity(4 + start.len());
        bind.push(&window.seed);
        bind.push(&window.ceiling);
        bind.push(&window.lo);
        bind.push(&window.hi);
        bind.extend(start.iter().map(|id| id as &dyn ToSql));

        let config = store.config();
        let mut stmt = store.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(bind.as_slice(), |row| row_to_node_with_depth(row, config))?;
        let rows = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::debug!(
            starts = start.len(),
            include_self = options.include_self,
            to_depth = ?options.to_depth,
            at_depth = ?options.at_depth,
            count = rows.len(),
            "descendants"
        );
        Ok(rows)
    }

    // -------------------------------------------------------------------
    // Containment
    // -------------------------------------------------------------------

    /// Members of `chk` that are in `src` or below it, as full rows.
    pub fn nodes_within<S, T, C, U>(&self, src: S, chk: C) -> Result<Vec<Node>>
    where
        S: IntoIterator<Item = T>,
        T: Into<NodeId>,
        C: IntoIterator<Item = U>,
        U: Into<NodeId>,
    {
        let src = normalize_ids(src);
        let chk = normalize_ids(chk);
        if src.is_empty() || chk.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store;
        let sql = store.queries().nodes_within(src.len(), chk.len());
        let max_depth = store.max_depth();
        let bind = containment_params(&max_depth, &src, &chk);
        let found = store.query_nodes(&sql, bind.as_slice())?;
        tracing::debug!(src = src.len(), chk = chk.len(), found = found.len(), "nodes_within");
        Ok(found)
    }

    /// Whether any member of `chk` is in `src` or below it.
    pub fn is_within<S, T, C, U>(&self, src: S, chk: C) -> Result<bool>
    where
        S: IntoIterator<Item = T>,
        T: Into<NodeId>,
        C: IntoIterator<Item = U>,
        U: Into<NodeId>,
    {
        let src = normalize_ids(src);
        let chk = normalize_ids(chk);
        if src.is_empty() || chk.is_empty() {
            return Ok(false);
        }
        let store = self.store;
        let sql = store.queries().is_within(src.len(), chk.len());
        let max_depth = store.max_depth();
        let bind = containment_params(&max_depth, &src, &chk);
        let within: bool = store
            .conn
            .prepare_cached(&sql)?
            .query_row(bind.as_slice(), |row| row.get(0))?;
        Ok(within)
    }
}

fn containment_params<'p>(
    max_depth: &'p i64,
    src: &'p [NodeId],
    chk: &'p [NodeId],
) -> Vec<&'p dyn ToSql> {
    let mut bind: Vec<&dyn ToSql> = Vec::with_capacity(1 + src.len() + chk.len());
    bind.push(max_depth);
    bind.extend(src.iter().map(|id| id as &dyn ToSql));
    bind.extend(chk.iter().map(|id| id as &dyn ToSql));
    bind
}

// ---------------------------------------------------------------------------
// NodeScope
// ---------------------------------------------------------------------------

/// One node identity paired with a traversal.
#[derive(Debug, Clone, Copy)]
pub struct NodeScope<'a> {
    traversal: TreeTraversal<'a>,
    id: NodeId,
}

impl NodeScope<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn ancestors(&self) -> Result<Vec<Node>> {
        self.traversal.ancestors(self.id)
    }

    pub fn root(&self) -> Result<Option<Node>> {
        self.traversal.root(self.id)
    }

    pub fn depth(&self) -> Result<Option<u32>> {
        self.traversal.depth(self.id)
    }

    pub fn is_root(&self) -> Result<bool> {
        self.traversal.is_root(self.id)
    }

    pub fn siblings(&self) -> Result<Vec<Node>> {
        self.traversal.siblings(self.id)
    }

    pub fn self_and_siblings(&self) -> Result<Vec<Node>> {
        self.traversal.self_and_siblings(self.id)
    }

    pub fn parent(&self) -> Result<Option<Node>> {
        self.traversal.store.parent(self.id)
    }

    pub fn children(&self) -> Result<Vec<Node>> {
        self.traversal.store.children(self.id)
    }

    pub fn descendants(&self, options: DescendantOptions) -> Result<DescendantResult> {
        self.traversal.descendants(self.id, options)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
