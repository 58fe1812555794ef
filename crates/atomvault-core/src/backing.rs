//! # Backing Store Boundary
//!
//! The capability set an AtomSpace needs from a persistence engine.
//!
//! The AtomSpace depends only on this trait. Engines are interchangeable:
//! the crate ships an in-process engine (`MemoryStorage`) and a relational
//! one (`SqlStorage`), and a binding can be swapped at runtime.

use crate::{Atom, AtomUuid, Value, VaultError};
use std::fmt::Debug;

/// An atom materialized from a backing store together with every value
/// persisted for it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAtom {
    /// The UUID the store assigned to this content.
    pub uuid: AtomUuid,
    /// The atom content.
    pub atom: Atom,
    /// Persisted value slots as (key, value) pairs.
    pub values: Vec<(Atom, Value)>,
}

impl StoredAtom {
    /// Look up the persisted value for a key.
    #[must_use]
    pub fn value(&self, key: &Atom) -> Option<&Value> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// The contract every persistence engine implements.
///
/// Writes (`store_atom`, `store_value`) may be asynchronous: they return once
/// the work is accepted, and failures applying it surface at the next
/// [`barrier`](BackingStore::barrier). Fetches are synchronous and observe
/// every write that completed before the last barrier returned.
///
/// Implementations must be `Send + Sync`; one engine may back several
/// AtomSpaces at once.
pub trait BackingStore: Send + Sync + Debug {
    /// Readiness probe. A store that is not connected fails every other
    /// operation with `VaultError::Connection`.
    fn connected(&self) -> bool;

    /// Persist atom content, assigning it a UUID if it has none.
    fn store_atom(&self, atom: &Atom) -> Result<(), VaultError>;

    /// Persist the value of one (atom, key) slot, replacing any previous one.
    ///
    /// Both the atom and the key are persisted as needed.
    fn store_value(&self, atom: &Atom, key: &Atom, value: &Value) -> Result<(), VaultError>;

    /// Resolve content to its stored record. `Ok(None)` when never stored.
    fn fetch_atom(&self, atom: &Atom) -> Result<Option<StoredAtom>, VaultError>;

    /// Resolve a UUID to its stored record. `Ok(None)` when unknown.
    fn fetch_atom_by_uuid(&self, uuid: AtomUuid) -> Result<Option<StoredAtom>, VaultError>;

    /// Read the persisted value of one slot.
    fn fetch_value(&self, atom: &Atom, key: &Atom) -> Result<Option<Value>, VaultError>;

    /// Block until every write accepted before this call has been applied
    /// and is visible to fetches from any connection.
    fn barrier(&self) -> Result<(), VaultError>;
}
