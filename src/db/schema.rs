//! SQLite connection setup and tree table DDL.
//!
//! The tree lives in one table: an integer identity, a nullable parent
//! reference back into the same table, and whatever extra columns the
//! caller wants to carry along.

use rusqlite::Connection;

use crate::config::schema::{quote_identifier, validate_identifier};
use crate::config::TreeConfig;
use crate::error::{Result, TreeError};

/// Open (or create) the SQLite database at `db_path`.
///
/// Foreign keys are enforced so the parent column's `ON DELETE` action
/// fires. File databases run in WAL mode with synchronous NORMAL.
pub fn open_database(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    // -- Pragmas ----------------------------------------------------------
    if db_path != ":memory:" {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    Ok(conn)
}

/// Create the configured tree table plus an index on the parent column.
///
/// `extra_columns` are `(name, sql_type)` pairs appended after the key
/// columns. Self-parenting is also rejected by a `CHECK` constraint so raw
/// SQL writes cannot bypass it.
pub fn create_tree_table(
    conn: &Connection,
    config: &TreeConfig,
    extra_columns: &[(&str, &str)],
) -> Result<()> {
    config.validate()?;

    let table = quote_identifier(&config.table);
    let pk = quote_identifier(&config.primary_key);
    let fk = quote_identifier(&config.foreign_key);
    let on_delete = if config.cascade_on_delete {
        "CASCADE"
    } else {
        "SET NULL"
    };

    let mut columns = vec![
        format!("{pk} INTEGER PRIMARY KEY"),
        format!("{fk} INTEGER REFERENCES {table}({pk}) ON DELETE {on_delete}"),
    ];
    for (name, sql_type) in extra_columns {
        validate_identifier(name)?;
        if sql_type.is_empty()
            || !sql_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_')
        {
            return Err(TreeError::InvalidConfig(format!(
                "column type {sql_type:?} for {name} is not a plain SQL type"
            )));
        }
        columns.push(format!("{} {sql_type}", quote_identifier(name)));
    }
    columns.push(format!("CHECK ({fk} IS NULL OR {fk} <> {pk})"));

    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n  {}\n)",
        columns.join(",\n  ")
    );
    conn.execute_batch(&ddl)?;

    let index = format!(
        "CREATE INDEX IF NOT EXISTS {} ON {table}({fk}, {pk})",
        quote_identifier(&format!("idx_{}_{}", config.table, config.foreign_key))
    );
    conn.execute_batch(&index)?;

    tracing::debug!(table = %config.table, "tree table ready");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(config: &TreeConfig) -> Connection {
        let conn = open_database(":memory:").expect("in-memory database should open");
        create_tree_table(&conn, config, &[("name", "TEXT")]).expect("table creation");
        conn
    }

    fn object_exists(conn: &Connection, obj_type: &str, obj_name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                rusqlite::params![obj_type, obj_name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    #[test]
    fn table_and_index_exist() {
        let conn = setup(&TreeConfig::default());
        assert!(object_exists(&conn, "table", "nodes"));
        assert!(object_exists(&conn, "index", "idx_nodes_parent_id"));
    }

    #[test]
    fn custom_names_are_used() {
        let config = TreeConfig::for_table("folders").with_foreign_key("folder_id");
        let conn = setup(&config);
        assert!(object_exists(&conn, "table", "folders"));
        conn.execute("INSERT INTO folders (id, folder_id, name) VALUES (1, NULL, 'a')", [])
            .unwrap();
    }

    #[test]
    fn create_is_idempotent() {
        let config = TreeConfig::default();
        let conn = setup(&config);
        create_tree_table(&conn, &config, &[("name", "TEXT")]).unwrap();
    }

    #[test]
    fn check_constraint_blocks_self_parent() {
        let conn = setup(&TreeConfig::default());
        conn.execute("INSERT INTO nodes (id, parent_id) VALUES (1, NULL)", [])
            .unwrap();
        let res = conn.execute("UPDATE nodes SET parent_id = 1 WHERE id = 1", []);
        assert!(res.is_err(), "self-parent update should violate CHECK");
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_database(":memory:").unwrap();
        let on: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(on, 1);
    }

    #[test]
    fn bad_extra_column_rejected() {
        let conn = open_database(":memory:").unwrap();
        let err = create_tree_table(&conn, &TreeConfig::default(), &[("bad name", "TEXT")])
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidIdentifier(_)));

        let err = create_tree_table(&conn, &TreeConfig::default(), &[("name", "TEXT);--")])
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidConfig(_)));
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.db");
        let conn = open_database(path.to_str().unwrap()).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
