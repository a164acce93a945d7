//! sanetree: hierarchical queries over a parent-pointer tree in one SQL
//! table.
//!
//! Ancestors, descendants, depth, siblings, and subtree containment are
//! answered with recursive CTEs against SQLite; nested results are rebuilt
//! from flat, depth-ordered rows only when asked for.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod tree;
pub mod types;

pub use config::TreeConfig;
pub use error::{Result, TreeError};
pub use tree::{
    DescendantOptions, DescendantResult, Forest, NodeScope, TreeNode, TreeStore, TreeTraversal,
};
pub use types::{Node, NodeId, NodeWithDepth};
