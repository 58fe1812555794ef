//! # In-Process Storage
//!
//! A `BackingStore` that keeps everything in memory behind a single mutex.
//!
//! Writes apply synchronously, so `barrier` never waits. Values are held as
//! whole-value payloads (see [`crate::formats::value_codec`]) so that every
//! fetch decodes a fresh tree, exactly as a persistent engine would.

use crate::backing::{BackingStore, StoredAtom};
use crate::formats::value_codec;
use crate::storage::StoreStats;
use crate::{Atom, AtomUuid, Value, VaultError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct MemoryTables {
    /// Last UUID handed out. Never rewinds, not even on reset.
    last_uuid: u64,
    by_content: BTreeMap<Atom, AtomUuid>,
    by_uuid: BTreeMap<AtomUuid, Atom>,
    /// (atom, key) -> encoded value.
    values: BTreeMap<(AtomUuid, AtomUuid), Vec<u8>>,
}

impl MemoryTables {
    fn claim(&mut self, atom: &Atom) -> AtomUuid {
        if let Some(uuid) = self.by_content.get(atom) {
            return *uuid;
        }
        for child in atom.outgoing() {
            self.claim(child);
        }
        self.last_uuid += 1;
        let uuid = AtomUuid(self.last_uuid);
        self.by_content.insert(atom.clone(), uuid);
        self.by_uuid.insert(uuid, atom.clone());
        uuid
    }

    fn materialize(&self, uuid: AtomUuid) -> Result<Option<StoredAtom>, VaultError> {
        let Some(atom) = self.by_uuid.get(&uuid) else {
            return Ok(None);
        };
        let mut values = Vec::new();
        for ((_, key_uuid), payload) in self
            .values
            .range((uuid, AtomUuid(0))..=(uuid, AtomUuid(u64::MAX)))
        {
            let key = self.by_uuid.get(key_uuid).ok_or_else(|| {
                VaultError::CorruptData(format!("value key {} has no atom", key_uuid))
            })?;
            values.push((key.clone(), value_codec::decode(payload)?));
        }
        Ok(Some(StoredAtom {
            uuid,
            atom: atom.clone(),
            values,
        }))
    }
}

/// In-memory backing store, shareable between AtomSpaces via `Arc`.
#[derive(Debug)]
pub struct MemoryStorage {
    tables: Mutex<MemoryTables>,
    connected: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(MemoryTables::default()),
            connected: AtomicBool::new(true),
        }
    }

    /// Remove every atom and value. UUIDs handed out before are not reused.
    pub fn reset(&self) -> Result<(), VaultError> {
        self.ensure_connected()?;
        let mut tables = self.tables.lock();
        tables.by_content.clear();
        tables.by_uuid.clear();
        tables.values.clear();
        tracing::info!("memory storage reset");
        Ok(())
    }

    /// Row counts. Values are stored whole, so `value_parts` is always 0.
    pub fn stats(&self) -> Result<StoreStats, VaultError> {
        self.ensure_connected()?;
        let tables = self.tables.lock();
        Ok(StoreStats {
            atoms: tables.by_uuid.len() as u64,
            valuations: tables.values.len() as u64,
            value_parts: 0,
        })
    }

    /// Disconnect. Every later operation fails with `Connection`.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), VaultError> {
        if self.connected() {
            Ok(())
        } else {
            Err(VaultError::Connection("memory storage is closed".to_string()))
        }
    }
}

impl BackingStore for MemoryStorage {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn store_atom(&self, atom: &Atom) -> Result<(), VaultError> {
        self.ensure_connected()?;
        self.tables.lock().claim(atom);
        Ok(())
    }

    fn store_value(&self, atom: &Atom, key: &Atom, value: &Value) -> Result<(), VaultError> {
        self.ensure_connected()?;
        // Encode before taking the lock; a value that cannot be encoded
        // leaves the tables untouched.
        let payload = value_codec::encode(value)?;
        let mut tables = self.tables.lock();
        let atom_uuid = tables.claim(atom);
        let key_uuid = tables.claim(key);
        tables.values.insert((atom_uuid, key_uuid), payload);
        Ok(())
    }

    fn fetch_atom(&self, atom: &Atom) -> Result<Option<StoredAtom>, VaultError> {
        self.ensure_connected()?;
        let tables = self.tables.lock();
        match tables.by_content.get(atom) {
            Some(uuid) => tables.materialize(*uuid),
            None => Ok(None),
        }
    }

    fn fetch_atom_by_uuid(&self, uuid: AtomUuid) -> Result<Option<StoredAtom>, VaultError> {
        self.ensure_connected()?;
        self.tables.lock().materialize(uuid)
    }

    fn fetch_value(&self, atom: &Atom, key: &Atom) -> Result<Option<Value>, VaultError> {
        self.ensure_connected()?;
        let tables = self.tables.lock();
        let (Some(atom_uuid), Some(key_uuid)) =
            (tables.by_content.get(atom), tables.by_content.get(key))
        else {
            return Ok(None);
        };
        tables
            .values
            .get(&(*atom_uuid, *key_uuid))
            .map(|payload| value_codec::decode(payload))
            .transpose()
    }

    fn barrier(&self) -> Result<(), VaultError> {
        self.ensure_connected()
    }
}

// =============================================================================
// TESTS
// =============================================================================
