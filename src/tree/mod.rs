//! Tree layer: SQLite-backed store, traversal queries, and materialization.

pub mod materialize;
pub mod sql;
pub mod store;
pub mod traversal;

pub use materialize::{materialize, Forest, TreeNode};
pub use store::TreeStore;
pub use traversal::{DescendantOptions, DescendantResult, NodeScope, TreeTraversal};
