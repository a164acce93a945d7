//! Rebuild nested trees from a flat, depth-ordered node listing.
//!
//! The input must list every parent before its children, which is exactly
//! what the descendant query's `ORDER BY depth, parent` guarantees. The
//! pass is single and non-recursive: nodes go into an arena, children are
//! linked by index, and the nested [`Forest`] is assembled back to front so
//! deep trees never touch the call stack.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{Node, NodeId};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A node and its nested children, in query order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub node: Node,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// This node plus everything below it.
    pub fn total_nodes(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            total += 1;
            stack.extend(current.children.iter());
        }
        total
    }
}

/// Ordered top-level entries of a materialized result.
///
/// Top-level entries are the rows whose parent was not itself part of the
/// result, normally the start nodes (or their children when self was
/// excluded).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Forest {
    pub roots: Vec<TreeNode>,
}

impl Forest {
    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeNode> {
        self.roots.iter()
    }

    /// Every node at every level.
    pub fn total_nodes(&self) -> usize {
        self.roots.iter().map(TreeNode::total_nodes).sum()
    }

    /// Depth-first search for `id`.
    pub fn find(&self, id: NodeId) -> Option<&TreeNode> {
        let mut stack: Vec<&TreeNode> = self.roots.iter().rev().collect();
        while let Some(current) = stack.pop() {
            if current.node.id == id {
                return Some(current);
            }
            stack.extend(current.children.iter().rev());
        }
        None
    }

    /// Pre-order ids.
    pub fn preorder_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<&TreeNode> = self.roots.iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current.node.id);
            stack.extend(current.children.iter().rev());
        }
        out
    }

    /// Nested `{id: {child_id: {...}}}` object, keys in result order.
    pub fn to_id_map(&self) -> Value {
        fn level(nodes: &[TreeNode]) -> Value {
            let mut map = Map::new();
            for tree in nodes {
                map.insert(tree.node.id.to_string(), level(&tree.children));
            }
            Value::Object(map)
        }
        level(&self.roots)
    }
}

impl IntoIterator for Forest {
    type Item = TreeNode;
    type IntoIter = std::vec::IntoIter<TreeNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.roots.into_iter()
    }
}

// ---------------------------------------------------------------------------
// materialize
// ---------------------------------------------------------------------------

/// Nest a depth-ordered listing.
///
/// A row whose parent was seen earlier becomes that parent's child;
/// otherwise it stays top-level. A repeated id (possible when overlapping
/// start nodes reach the same row twice) keeps its first placement.
pub fn materialize<I>(rows: I) -> Forest
where
    I: IntoIterator<Item = Node>,
{
    let mut arena: Vec<(Node, Vec<usize>)> = Vec::new();
    let mut cache: HashMap<NodeId, usize> = HashMap::new();
    let mut top: Vec<usize> = Vec::new();

    for node in rows {
        if cache.contains_key(&node.id) {
            continue;
        }
        let idx = arena.len();
        cache.insert(node.id, idx);
        match node.parent_id.and_then(|p| cache.get(&p).copied()) {
            Some(parent_idx) => arena[parent_idx].1.push(idx),
            None => top.push(idx),
        }
        arena.push((node, Vec::new()));
    }

    // Children always sit at higher indices than their parent, so walking
    // backwards finishes every subtree before its parent needs it.
    let mut built: Vec<Option<TreeNode>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);
    for (idx, (node, child_idx)) in arena.into_iter().enumerate().rev() {
        let children = child_idx
            .into_iter()
            .filter_map(|c| built[c].take())
            .collect();
        built[idx] = Some(TreeNode { node, children });
    }

    Forest {
        roots: top.into_iter().filter_map(|i| built[i].take()).collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
