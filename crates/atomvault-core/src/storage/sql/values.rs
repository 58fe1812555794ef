//! # Value Rows
//!
//! Recursive mapping between value trees and the `valuations` /
//! `value_parts` tables.
//!
//! A slot is one `valuations` row. Float and string sequences are stored
//! inline in the `floats` / `strings` column. A composite stores, in its
//! `links` column, the ordered list of `value_parts` ids of its elements;
//! every position gets its own part row, so repeated content is stored once
//! per occurrence and the exact sequence survives.

use super::db_err;
use crate::formats::value_codec::{
    decode_floats, decode_ids, decode_strings, encode_floats, encode_ids, encode_strings,
};
use crate::{AtomUuid, Value, ValueKind, VaultError};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;

/// The payload columns shared by both tables.
struct PayloadRow {
    kind: i64,
    floats: Option<Vec<u8>>,
    strings: Option<Vec<u8>>,
    links: Option<Vec<u8>>,
}

impl PayloadRow {
    /// Read `kind, floats, strings, links` starting at column 0.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            floats: row.get(1)?,
            strings: row.get(2)?,
            links: row.get(3)?,
        })
    }

    /// Part ids referenced by a composite row; empty for other kinds.
    fn part_ids(&self) -> Result<Vec<u64>, VaultError> {
        match &self.links {
            Some(links) if self.kind == ValueKind::Link.tag() => decode_ids(links),
            _ => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// WRITE
// =============================================================================

/// Replace the value of one slot. Runs inside the caller's transaction.
pub fn write_value(
    conn: &Connection,
    atom: AtomUuid,
    key: AtomUuid,
    value: &Value,
) -> Result<(), VaultError> {
    delete_value(conn, atom, key)?;
    let (floats, strings, links) = payload_columns(conn, value)?;
    conn.execute(
        "INSERT INTO valuations (atom, key, kind, floats, strings, links) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            atom.0 as i64,
            key.0 as i64,
            value.kind().tag(),
            floats,
            strings,
            links
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

type Columns = (Option<Vec<u8>>, Option<Vec<u8>>, Option<Vec<u8>>);

/// Encode the payload columns of a value, writing composite elements as
/// part rows first.
fn payload_columns(conn: &Connection, value: &Value) -> Result<Columns, VaultError> {
    match value {
        Value::Float(items) => Ok((Some(encode_floats(items)?), None, None)),
        Value::String(items) => Ok((None, Some(encode_strings(items)?), None)),
        Value::Link(items) => {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                ids.push(insert_part(conn, item)?);
            }
            Ok((None, None, Some(encode_ids(&ids)?)))
        }
    }
}

fn insert_part(conn: &Connection, value: &Value) -> Result<u64, VaultError> {
    let (floats, strings, links) = payload_columns(conn, value)?;
    conn.execute(
        "INSERT INTO value_parts (kind, floats, strings, links) VALUES (?1, ?2, ?3, ?4)",
        params![value.kind().tag(), floats, strings, links],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Remove a slot and every part row it owns. Returns false when the slot
/// held nothing.
pub fn delete_value(conn: &Connection, atom: AtomUuid, key: AtomUuid) -> Result<bool, VaultError> {
    let row = conn
        .query_row(
            "SELECT kind, floats, strings, links FROM valuations WHERE atom = ?1 AND key = ?2",
            params![atom.0 as i64, key.0 as i64],
            PayloadRow::from_row,
        )
        .optional()
        .map_err(db_err)?;
    let Some(row) = row else {
        return Ok(false);
    };

    // Worklist with a visited set: a corrupted tree must not loop forever.
    let mut pending = row.part_ids()?;
    let mut visited = BTreeSet::new();
    while let Some(vuid) = pending.pop() {
        if !visited.insert(vuid) {
            continue;
        }
        if let Some(part) = read_part(conn, vuid)? {
            pending.extend(part.part_ids()?);
        }
        conn.execute("DELETE FROM value_parts WHERE vuid = ?1", [vuid as i64])
            .map_err(db_err)?;
    }

    conn.execute(
        "DELETE FROM valuations WHERE atom = ?1 AND key = ?2",
        params![atom.0 as i64, key.0 as i64],
    )
    .map_err(db_err)?;
    Ok(true)
}

// =============================================================================
// READ
// =============================================================================

fn read_part(conn: &Connection, vuid: u64) -> Result<Option<PayloadRow>, VaultError> {
    conn.query_row(
        "SELECT kind, floats, strings, links FROM value_parts WHERE vuid = ?1",
        [vuid as i64],
        PayloadRow::from_row,
    )
    .optional()
    .map_err(db_err)
}

/// Read the value of one slot.
pub fn read_value(
    conn: &Connection,
    atom: AtomUuid,
    key: AtomUuid,
) -> Result<Option<Value>, VaultError> {
    let row = conn
        .query_row(
            "SELECT kind, floats, strings, links FROM valuations WHERE atom = ?1 AND key = ?2",
            params![atom.0 as i64, key.0 as i64],
            PayloadRow::from_row,
        )
        .optional()
        .map_err(db_err)?;
    row.map(|row| decode_row(conn, row, &mut BTreeSet::new()))
        .transpose()
}

/// Read every slot of an atom as (key UUID, value), in key order.
pub fn read_values(conn: &Connection, atom: AtomUuid) -> Result<Vec<(AtomUuid, Value)>, VaultError> {
    let mut stmt = conn
        .prepare(
            "SELECT kind, floats, strings, links, key FROM valuations \
             WHERE atom = ?1 ORDER BY key",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([atom.0 as i64], |row| {
            Ok((AtomUuid(row.get::<_, i64>(4)? as u64), PayloadRow::from_row(row)?))
        })
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;

    let mut values = Vec::with_capacity(rows.len());
    for (key, row) in rows {
        values.push((key, decode_row(conn, row, &mut BTreeSet::new())?));
    }
    Ok(values)
}

/// Rebuild a value from its row. `path` holds the part ids on the way down;
/// meeting one again is a cycle.
fn decode_row(
    conn: &Connection,
    row: PayloadRow,
    path: &mut BTreeSet<u64>,
) -> Result<Value, VaultError> {
    let missing = |column: &str| {
        VaultError::CorruptData(format!("value row of kind {} has no {} column", row.kind, column))
    };
    match ValueKind::from_tag(row.kind)? {
        ValueKind::Float => {
            let bytes = row.floats.as_deref().ok_or_else(|| missing("floats"))?;
            Ok(Value::Float(decode_floats(bytes)?))
        }
        ValueKind::String => {
            let bytes = row.strings.as_deref().ok_or_else(|| missing("strings"))?;
            Ok(Value::String(decode_strings(bytes)?))
        }
        ValueKind::Link => {
            let bytes = row.links.as_deref().ok_or_else(|| missing("links"))?;
            let mut items = Vec::new();
            for vuid in decode_ids(bytes)? {
                if !path.insert(vuid) {
                    return Err(VaultError::CorruptData(format!(
                        "value part {} contains itself",
                        vuid
                    )));
                }
                let part = read_part(conn, vuid)?.ok_or_else(|| {
                    VaultError::CorruptData(format!("missing value part {}", vuid))
                })?;
                items.push(decode_row(conn, part, path)?);
                path.remove(&vuid);
            }
            Ok(Value::Link(items))
        }
    }
}
