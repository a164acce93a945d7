//! Error types for sanetree.
//!
//! Store failures pass through untouched via `#[from]`. Missing rows are not
//! errors anywhere in the crate: lookups return empty collections, `None`
//! or `false` instead.

use thiserror::Error;

use crate::types::NodeId;

/// Every failure the store, traversal, config, and CLI layers can report.
#[derive(Error, Debug)]
pub enum TreeError {
    /// Error bubbled up from SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Write rejected because the node would become its own parent.
    #[error("node {id} cannot be its own parent")]
    OwnParent { id: NodeId },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A table or column name is not a plain SQL identifier.
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TreeError>;
