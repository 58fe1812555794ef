//! Relational schema and connection setup.

use super::db_err;
use crate::VaultError;
use crate::config::StorageConfig;
use rusqlite::Connection;
use std::path::Path;

/// Atom identities. Nodes carry a name and an empty outgoing list; links
/// carry a NULL name and the ordered list of outgoing UUIDs.
pub const CREATE_ATOMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS atoms (
    uuid INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    name TEXT NULL,
    outgoing BLOB NOT NULL
)
"#;

/// One row per (atom, key) slot. Exactly one payload column is set,
/// selected by `kind`.
pub const CREATE_VALUATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS valuations (
    atom INTEGER NOT NULL,
    key INTEGER NOT NULL,
    kind INTEGER NOT NULL,
    floats BLOB NULL,
    strings BLOB NULL,
    links BLOB NULL,
    PRIMARY KEY (atom, key)
)
"#;

/// Elements of composite values, one row per position.
pub const CREATE_VALUE_PARTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS value_parts (
    vuid INTEGER PRIMARY KEY AUTOINCREMENT,
    kind INTEGER NOT NULL,
    floats BLOB NULL,
    strings BLOB NULL,
    links BLOB NULL
)
"#;

/// Single-row table holding the reset generation. Every reset bumps it, so
/// identity caches can tell mappings from before a reset.
pub const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    generation INTEGER NOT NULL
)
"#;

pub const SEED_META: &str = "INSERT OR IGNORE INTO meta (id, generation) VALUES (1, 0)";

/// Content uniqueness: the guard behind UUID claims.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_atoms_node ON atoms(type, name) WHERE name IS NOT NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_atoms_link ON atoms(type, outgoing) WHERE name IS NULL",
];

pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_ATOMS_TABLE,
        CREATE_VALUATIONS_TABLE,
        CREATE_VALUE_PARTS_TABLE,
        CREATE_META_TABLE,
        SEED_META,
    ];
    stmts.extend(CREATE_INDEXES);
    stmts
}

/// Open a connection with WAL journaling and the configured busy timeout.
pub fn open_connection(path: &Path, config: &StorageConfig) -> Result<Connection, VaultError> {
    let conn = Connection::open(path)
        .map_err(|e| VaultError::Connection(format!("{}: {}", path.display(), e)))?;
    conn.busy_timeout(config.busy_timeout()).map_err(db_err)?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(db_err)?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(mode = %mode, "database did not switch to WAL journaling");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(db_err)?;
    Ok(conn)
}

/// Create tables and indexes that do not exist yet.
pub fn initialize(conn: &Connection) -> Result<(), VaultError> {
    for stmt in all_schema_statements() {
        conn.execute(stmt, []).map_err(db_err)?;
    }
    Ok(())
}

/// Reset generation as seen by the current transaction.
pub fn generation(conn: &Connection) -> Result<u64, VaultError> {
    let generation: i64 = conn
        .query_row("SELECT generation FROM meta WHERE id = 1", [], |row| row.get(0))
        .map_err(db_err)?;
    Ok(generation as u64)
}

/// Advance the reset generation, returning the new one. Run inside the
/// transaction that deletes the rows.
pub fn bump_generation(conn: &Connection) -> Result<u64, VaultError> {
    conn.execute("UPDATE meta SET generation = generation + 1 WHERE id = 1", [])
        .map_err(db_err)?;
    generation(conn)
}
