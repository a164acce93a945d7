//! Configuration data structures for sanetree.
//!
//! One [`TreeConfig`] describes one tree table: which table, which columns
//! hold the identity and the parent reference, how siblings are ordered,
//! and the recursion ceiling. Loaded from YAML with serde; every field has
//! a default so an empty document is valid.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};

/// Environment variable that overrides [`TreeConfig::max_depth`].
pub const MAX_DEPTH_ENV: &str = "SANETREE_MAX_DEPTH";

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

// ---------------------------------------------------------------------------
// TreeConfig
// ---------------------------------------------------------------------------

/// Table and column naming plus traversal limits for one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Table holding the node rows.
    #[serde(default = "default_table")]
    pub table: String,

    /// Identity column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Column holding the parent reference.
    #[serde(default = "default_foreign_key")]
    pub foreign_key: String,

    /// SQL ordering fragment for children and roots, e.g. `name ASC`.
    /// Columns must be unqualified since descendant listings sort a CTE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,

    /// Ceiling on recursive expansion. Traversals stop silently here.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Deleting a node deletes its subtree. When false, children are
    /// re-rooted instead.
    #[serde(default = "default_cascade_on_delete")]
    pub cascade_on_delete: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            primary_key: default_primary_key(),
            foreign_key: default_foreign_key(),
            order: None,
            max_depth: default_max_depth(),
            cascade_on_delete: default_cascade_on_delete(),
        }
    }
}

impl TreeConfig {
    /// Config for `table` with every other option at its default.
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn with_foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = column.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_cascade_on_delete(mut self, cascade: bool) -> Self {
        self.cascade_on_delete = cascade;
        self
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_env_overrides()?;
        tracing::debug!(path = %path.display(), table = %config.table, "loaded tree config");
        Ok(config)
    }

    /// Apply `SANETREE_MAX_DEPTH` if set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(MAX_DEPTH_ENV) {
            self.max_depth = parse_max_depth(&raw)?;
        }
        Ok(())
    }

    /// Reject names that cannot be spliced into SQL and limits that make
    /// every traversal empty.
    pub fn validate(&self) -> Result<()> {
        for ident in [&self.table, &self.primary_key, &self.foreign_key] {
            validate_identifier(ident)?;
        }
        if self.primary_key == self.foreign_key {
            return Err(TreeError::InvalidConfig(
                "primary_key and foreign_key must be different columns".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(TreeError::InvalidConfig("max_depth must be at least 1".into()));
        }
        if let Some(order) = &self.order {
            if order.trim().is_empty() || order.contains(';') || order.contains("--") {
                return Err(TreeError::InvalidConfig(format!(
                    "order fragment {order:?} is not a plain ORDER BY list"
                )));
            }
            // descendant listings sort the CTE, not the table itself
            if order.contains('.') {
                return Err(TreeError::InvalidConfig(format!(
                    "order fragment {order:?} must use unqualified column names"
                )));
            }
        }
        Ok(())
    }

    /// `ORDER BY` list for sibling and root listings, falling back to the
    /// identity column so results stay deterministic.
    pub fn order_clause(&self) -> String {
        match &self.order {
            Some(order) => format!("{order}, {}", quote_identifier(&self.primary_key)),
            None => quote_identifier(&self.primary_key),
        }
    }
}

// ---------------------------------------------------------------------------
// Identifier helpers
// ---------------------------------------------------------------------------

/// Accept only plain `[A-Za-z_][A-Za-z0-9_]*` identifiers.
pub fn validate_identifier(ident: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(ident) {
        Ok(())
    } else {
        Err(TreeError::InvalidIdentifier(ident.to_string()))
    }
}

/// Double-quote an identifier that already passed [`validate_identifier`].
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn parse_max_depth(raw: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(TreeError::InvalidConfig(format!(
            "{MAX_DEPTH_ENV}={raw:?} is not a positive integer"
        ))),
        Ok(n) => Ok(n),
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_table() -> String {
    "nodes".to_string()
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_foreign_key() -> String {
    "parent_id".to_string()
}

fn default_max_depth() -> u32 {
    100_000
}

fn default_cascade_on_delete() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
