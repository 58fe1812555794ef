//! # Identity Management
//!
//! Content ⇄ UUID resolution for the relational engine.
//!
//! The cache is shared by every worker and the reader. Lookups that miss go
//! to the `atoms` table. Writers claim UUIDs inside their own transaction
//! with `INSERT OR IGNORE`; an ignored insert means another transaction
//! committed the same content first, and the claimant adopts that UUID.
//!
//! Mappings learned inside a transaction are collected in a [`Learned`]
//! list and published to the cache only once that transaction commits, so
//! the cache never holds a UUID whose row was rolled back.
//!
//! A reset deletes every row, so mappings only hold within one reset
//! generation (see `schema::generation`). Each transaction reads the
//! generation first and consults the cache through a [`CacheView`] of it;
//! a reset by any connection, in this process or another, invalidates the
//! cache at the next transaction.

use super::db_err;
use crate::formats::value_codec::{decode_ids, encode_ids};
use crate::{Atom, AtomType, AtomUuid, VaultError};
use parking_lot::RwLock;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet};

/// Mappings discovered during one transaction, pending publication.
pub type Learned = Vec<(Atom, AtomUuid)>;

// =============================================================================
// CACHE
// =============================================================================

#[derive(Debug, Default)]
struct CacheMaps {
    /// Reset generation every mapping below belongs to.
    generation: u64,
    by_content: BTreeMap<Atom, AtomUuid>,
    by_uuid: BTreeMap<AtomUuid, Atom>,
}

impl CacheMaps {
    /// Forget everything from before `generation`. False when `generation`
    /// is older than the maps.
    fn advance(&mut self, generation: u64) -> bool {
        if generation > self.generation {
            if !self.by_uuid.is_empty() {
                tracing::debug!(
                    from = self.generation,
                    to = generation,
                    dropped = self.by_uuid.len(),
                    "identity cache invalidated by reset"
                );
            }
            self.by_content.clear();
            self.by_uuid.clear();
            self.generation = generation;
        }
        generation == self.generation
    }
}

/// Bidirectional content ⇄ UUID cache, tagged with the reset generation
/// its mappings were learned under.
#[derive(Debug, Default)]
pub struct IdentityCache {
    maps: RwLock<CacheMaps>,
}

impl IdentityCache {
    /// Lookups for a transaction that read `generation` from the database.
    ///
    /// A newer generation clears the cache first. A view of an older one
    /// misses every lookup.
    pub fn view(&self, generation: u64) -> CacheView<'_> {
        if self.maps.read().generation < generation {
            self.maps.write().advance(generation);
        }
        CacheView {
            cache: self,
            generation,
        }
    }

    /// Move to `generation`, dropping older mappings.
    pub fn advance(&self, generation: u64) {
        self.maps.write().advance(generation);
    }

    /// Publish mappings from a transaction that committed under `generation`.
    ///
    /// Mappings from before the current generation are discarded.
    pub fn publish(&self, generation: u64, learned: Learned) {
        if learned.is_empty() {
            return;
        }
        let mut maps = self.maps.write();
        if !maps.advance(generation) {
            tracing::debug!(generation, discarded = learned.len(), "stale identities discarded");
            return;
        }
        for (atom, uuid) in learned {
            maps.by_uuid.insert(uuid, atom.clone());
            maps.by_content.insert(atom, uuid);
        }
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_uuid.len()
    }
}

/// The cache as seen by one transaction.
#[derive(Debug, Clone, Copy)]
pub struct CacheView<'a> {
    cache: &'a IdentityCache,
    generation: u64,
}

impl CacheView<'_> {
    pub fn uuid_of(&self, atom: &Atom) -> Option<AtomUuid> {
        let maps = self.cache.maps.read();
        if maps.generation != self.generation {
            return None;
        }
        maps.by_content.get(atom).copied()
    }

    pub fn atom_of(&self, uuid: AtomUuid) -> Option<Atom> {
        let maps = self.cache.maps.read();
        if maps.generation != self.generation {
            return None;
        }
        maps.by_uuid.get(&uuid).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// =============================================================================
// ROW ENCODING
// =============================================================================

/// Column values identifying some content: (type, name, outgoing).
fn content_columns(
    conn: &Connection,
    cache: &CacheView<'_>,
    atom: &Atom,
    learned: &mut Learned,
) -> Result<Option<(String, Option<String>, Vec<u8>)>, VaultError> {
    match atom {
        Atom::Node { atom_type, name } => Ok(Some((
            atom_type.as_str().to_string(),
            Some(name.clone()),
            encode_ids(&[])?,
        ))),
        Atom::Link {
            atom_type,
            outgoing,
        } => {
            let mut ids = Vec::with_capacity(outgoing.len());
            for child in outgoing {
                match find_uuid(conn, cache, child, learned)? {
                    Some(uuid) => ids.push(uuid.0),
                    None => return Ok(None),
                }
            }
            Ok(Some((atom_type.as_str().to_string(), None, encode_ids(&ids)?)))
        }
    }
}

fn select_uuid(
    conn: &Connection,
    atom_type: &str,
    name: Option<&str>,
    outgoing: &[u8],
) -> Result<Option<AtomUuid>, VaultError> {
    let uuid: Option<i64> = match name {
        Some(name) => conn
            .query_row(
                "SELECT uuid FROM atoms WHERE type = ?1 AND name = ?2",
                params![atom_type, name],
                |row| row.get(0),
            )
            .optional(),
        None => conn
            .query_row(
                "SELECT uuid FROM atoms WHERE type = ?1 AND name IS NULL AND outgoing = ?2",
                params![atom_type, outgoing],
                |row| row.get(0),
            )
            .optional(),
    }
    .map_err(db_err)?;
    Ok(uuid.map(|u| AtomUuid(u as u64)))
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// Resolve content to a UUID without creating anything.
///
/// `Ok(None)` when the content (or, for a link, any atom it contains) was
/// never stored.
pub fn find_uuid(
    conn: &Connection,
    cache: &CacheView<'_>,
    atom: &Atom,
    learned: &mut Learned,
) -> Result<Option<AtomUuid>, VaultError> {
    if let Some(uuid) = cache.uuid_of(atom) {
        return Ok(Some(uuid));
    }
    if let Some((_, uuid)) = learned.iter().find(|(a, _)| a == atom) {
        return Ok(Some(*uuid));
    }
    let Some((atom_type, name, outgoing)) = content_columns(conn, cache, atom, learned)? else {
        return Ok(None);
    };
    let found = select_uuid(conn, &atom_type, name.as_deref(), &outgoing)?;
    if let Some(uuid) = found {
        learned.push((atom.clone(), uuid));
    }
    Ok(found)
}

/// Resolve a UUID to content, recursively for links.
pub fn find_atom(
    conn: &Connection,
    cache: &CacheView<'_>,
    uuid: AtomUuid,
    learned: &mut Learned,
) -> Result<Option<Atom>, VaultError> {
    let mut path = BTreeSet::new();
    resolve_atom(conn, cache, uuid, learned, &mut path)
}

fn resolve_atom(
    conn: &Connection,
    cache: &CacheView<'_>,
    uuid: AtomUuid,
    learned: &mut Learned,
    path: &mut BTreeSet<AtomUuid>,
) -> Result<Option<Atom>, VaultError> {
    if let Some(atom) = cache.atom_of(uuid) {
        return Ok(Some(atom));
    }
    if let Some((atom, _)) = learned.iter().find(|(_, u)| *u == uuid) {
        return Ok(Some(atom.clone()));
    }
    if !path.insert(uuid) {
        return Err(VaultError::CorruptData(format!(
            "atom {} contains itself",
            uuid
        )));
    }

    let row: Option<(String, Option<String>, Vec<u8>)> = conn
        .query_row(
            "SELECT type, name, outgoing FROM atoms WHERE uuid = ?1",
            [uuid.0 as i64],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((type_name, name, outgoing)) = row else {
        path.remove(&uuid);
        return Ok(None);
    };

    let atom_type = AtomType::new(type_name)
        .map_err(|e| VaultError::CorruptData(format!("atom {}: {}", uuid, e)))?;
    let atom = match name {
        Some(name) => Atom::Node { atom_type, name },
        None => {
            let mut children = Vec::new();
            for child in decode_ids(&outgoing)? {
                let child = resolve_atom(conn, cache, AtomUuid(child), learned, path)?
                    .ok_or_else(|| {
                        VaultError::CorruptData(format!(
                            "atom {} references missing atom {}",
                            uuid, child
                        ))
                    })?;
                children.push(child);
            }
            Atom::Link {
                atom_type,
                outgoing: children,
            }
        }
    };
    path.remove(&uuid);
    learned.push((atom.clone(), uuid));
    Ok(Some(atom))
}

// =============================================================================
// CLAIMS
// =============================================================================

/// Find or create the UUID for some content inside a write transaction.
///
/// Links claim their outgoing atoms first.
pub fn claim_uuid(
    conn: &Connection,
    cache: &CacheView<'_>,
    atom: &Atom,
    learned: &mut Learned,
) -> Result<AtomUuid, VaultError> {
    if let Some(uuid) = cache.uuid_of(atom) {
        return Ok(uuid);
    }
    if let Some((_, uuid)) = learned.iter().find(|(a, _)| a == atom) {
        return Ok(*uuid);
    }

    let (atom_type, name, outgoing) = match atom {
        Atom::Node { atom_type, name } => (
            atom_type.as_str().to_string(),
            Some(name.clone()),
            encode_ids(&[])?,
        ),
        Atom::Link {
            atom_type,
            outgoing,
        } => {
            let mut ids = Vec::with_capacity(outgoing.len());
            for child in outgoing {
                ids.push(claim_uuid(conn, cache, child, learned)?.0);
            }
            (atom_type.as_str().to_string(), None, encode_ids(&ids)?)
        }
    };

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO atoms (type, name, outgoing) VALUES (?1, ?2, ?3)",
            params![atom_type, name, outgoing],
        )
        .map_err(db_err)?;
    let uuid = if inserted == 1 {
        AtomUuid(conn.last_insert_rowid() as u64)
    } else {
        // Identity conflict: the content row was committed by another
        // transaction. Its UUID wins.
        let winner = select_uuid(conn, &atom_type, name.as_deref(), &outgoing)?.ok_or_else(
            || VaultError::Connection(format!("identity conflict on {} did not resolve", atom)),
        )?;
        tracing::debug!(atom = %atom, uuid = %winner, "adopted committed UUID");
        winner
    };
    learned.push((atom.clone(), uuid));
    Ok(uuid)
}
