//! Command-line front end: run tree queries against a SQLite file and print
//! JSON.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use crate::config::TreeConfig;
use crate::error::Result;
use crate::tree::{DescendantOptions, DescendantResult, TreeStore, TreeTraversal};
use crate::types::NodeId;

/// Query a parent-pointer tree stored in one SQLite table.
#[derive(Debug, Parser)]
#[command(name = "sanetree", version, about)]
pub struct Cli {
    /// SQLite database file.
    #[arg(long, env = "SANETREE_DB")]
    pub db: String,

    /// YAML tree config (table, columns, order, max_depth).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Pretty-print JSON output.
    #[arg(long)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List root nodes.
    Roots,
    /// Ancestors of a node, root first.
    Ancestors { id: i64 },
    /// Root of a node's tree (null when the node is a root).
    Root { id: i64 },
    /// Hops from a node to its root.
    Depth { id: i64 },
    /// Nodes sharing a parent with the node.
    Siblings { id: i64 },
    /// Descendants of one node, excluding the node.
    Descendants {
        id: i64,
        #[command(flatten)]
        depth: DepthArgs,
    },
    /// Start nodes and their descendants; every root when no ids are given.
    Tree {
        ids: Vec<i64>,
        /// Leave the start nodes out.
        #[arg(long)]
        no_self: bool,
        #[command(flatten)]
        depth: DepthArgs,
    },
    /// Candidates that lie within the source nodes' subtrees.
    Within {
        #[arg(long, value_delimiter = ',', required = true)]
        src: Vec<i64>,
        #[arg(long, value_delimiter = ',', required = true)]
        chk: Vec<i64>,
        /// Print only whether anything matched.
        #[arg(long)]
        check: bool,
    },
}

#[derive(Debug, Clone, Copy, Args)]
pub struct DepthArgs {
    /// Flat listing with depths instead of a nested tree.
    #[arg(long)]
    pub raw: bool,
    /// Keep rows whose depth is below this bound (start rows are depth 0,
    /// or -1 when excluded).
    #[arg(long)]
    pub to_depth: Option<u32>,
    /// Keep only this many hops below the start.
    #[arg(long)]
    pub at_depth: Option<u32>,
}

impl DepthArgs {
    fn options(self) -> DescendantOptions {
        DescendantOptions {
            include_self: true,
            raw: self.raw,
            to_depth: self.to_depth,
            at_depth: self.at_depth,
        }
    }
}

/// Resolve the config for `cli`: the YAML file if given, defaults
/// otherwise, environment overrides on top.
pub fn load_config(cli: &Cli) -> Result<TreeConfig> {
    match &cli.config {
        Some(path) => TreeConfig::load(path),
        None => {
            let mut config = TreeConfig::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }
}

/// Execute one command and return its JSON output.
pub fn run(cli: &Cli) -> Result<Value> {
    let config = load_config(cli)?;
    let conn = crate::db::schema::open_database(&cli.db)?;
    let store = TreeStore::new(conn, config)?;
    execute(&store, &cli.command)
}

/// Execute `command` against an already-open store.
pub fn execute(store: &TreeStore, command: &Command) -> Result<Value> {
    let t = TreeTraversal::new(store);
    let out = match command {
        Command::Roots => serde_json::to_value(t.roots()?)?,
        Command::Ancestors { id } => serde_json::to_value(t.ancestors(NodeId(*id))?)?,
        Command::Root { id } => serde_json::to_value(t.root(NodeId(*id))?)?,
        Command::Depth { id } => json!(t.depth(NodeId(*id))?),
        Command::Siblings { id } => serde_json::to_value(t.siblings(NodeId(*id))?)?,
        Command::Descendants { id, depth } => {
            descendants_json(t.descendants(NodeId(*id), depth.options())?)?
        }
        Command::Tree {
            ids,
            no_self,
            depth,
        } => {
            let mut options = depth.options();
            options.include_self = !no_self;
            descendants_json(t.nodes_and_descendants(ids.iter().copied(), options)?)?
        }
        Command::Within { src, chk, check } => {
            let src = src.iter().copied();
            let chk = chk.iter().copied();
            if *check {
                json!(t.is_within(src, chk)?)
            } else {
                serde_json::to_value(t.nodes_within(src, chk)?)?
            }
        }
    };
    Ok(out)
}

fn descendants_json(result: DescendantResult) -> Result<Value> {
    Ok(match result {
        DescendantResult::Flat(rows) => serde_json::to_value(rows)?,
        DescendantResult::Nested(forest) => serde_json::to_value(forest)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
