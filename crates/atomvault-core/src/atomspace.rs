//! # AtomSpace
//!
//! The in-memory hypergraph: a content-addressed arena of atoms with per-atom
//! value slots, optionally bound to one backing store.
//!
//! ## Identity
//!
//! Atoms live in an arena indexed by [`Handle`]. A `BTreeMap` from canonical
//! content (type + name, or type + outgoing handles) to handle enforces that
//! identical content is never resident twice, so comparing two handles is
//! comparing content.
//!
//! ## Backing Store Binding
//!
//! An AtomSpace holds at most one `Arc<dyn BackingStore>`. Without one it is
//! purely in-memory: `store_atom` is a local no-op, `barrier` returns at once,
//! and `fetch_atom` only sees resident atoms. Several AtomSpaces may share the
//! same engine.

use crate::backing::{BackingStore, StoredAtom};
use crate::{Atom, AtomType, AtomUuid, Handle, Value, VaultError};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// RECORDS
// =============================================================================

/// Canonical content of a resident atom, with children as local handles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Content {
    Node {
        atom_type: AtomType,
        name: String,
    },
    Link {
        atom_type: AtomType,
        outgoing: Vec<Handle>,
    },
}

#[derive(Debug)]
struct AtomRecord {
    content: Content,
    /// Value slots: key handle -> value.
    values: BTreeMap<Handle, Value>,
    /// UUID reported by the backing store, once fetched.
    uuid: Option<AtomUuid>,
    /// True once the value slots have been loaded from the backing store.
    materialized: bool,
}

impl AtomRecord {
    fn new(content: Content) -> Self {
        Self {
            content,
            values: BTreeMap::new(),
            uuid: None,
            materialized: false,
        }
    }
}

// =============================================================================
// ATOMSPACE
// =============================================================================

/// The hypergraph store.
///
/// Not designed for concurrent mutation: callers sharing one AtomSpace
/// across threads wrap it in a lock. Sharing between processes goes through
/// the backing store.
#[derive(Debug, Default)]
pub struct AtomSpace {
    /// Arena: `Handle(i)` is `records[i]`.
    records: Vec<AtomRecord>,
    /// Content -> handle.
    index: BTreeMap<Content, Handle>,
    /// The bound backing store, if any.
    backing: Option<Arc<dyn BackingStore>>,
}

impl AtomSpace {
    /// Create an empty, unbound AtomSpace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty AtomSpace bound to a backing store.
    #[must_use]
    pub fn with_backing(store: Arc<dyn BackingStore>) -> Self {
        Self {
            backing: Some(store),
            ..Self::default()
        }
    }

    // =========================================================================
    // BACKING STORE BINDING
    // =========================================================================

    /// Bind a backing store, returning the previous binding.
    pub fn set_backing(&mut self, store: Arc<dyn BackingStore>) -> Option<Arc<dyn BackingStore>> {
        self.backing.replace(store)
    }

    /// Unbind the backing store, returning it.
    pub fn clear_backing(&mut self) -> Option<Arc<dyn BackingStore>> {
        self.backing.take()
    }

    /// The bound backing store, if any.
    #[must_use]
    pub fn backing(&self) -> Option<&Arc<dyn BackingStore>> {
        self.backing.as_ref()
    }

    /// The bound store, failing fast if it reports itself disconnected.
    fn live_backing(&self) -> Result<Option<Arc<dyn BackingStore>>, VaultError> {
        match &self.backing {
            None => Ok(None),
            Some(store) if store.connected() => Ok(Some(Arc::clone(store))),
            Some(_) => Err(VaultError::Connection(
                "backing store is not connected".to_string(),
            )),
        }
    }

    // =========================================================================
    // INSERTION & LOOKUP
    // =========================================================================

    /// Number of resident atoms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no atom is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check whether a handle refers to a resident atom.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        (handle.0 as usize) < self.records.len()
    }

    /// Insert a node, or return the handle of the identical resident node.
    pub fn add_node(&mut self, atom_type: &str, name: impl Into<String>) -> Result<Handle, VaultError> {
        let content = Content::Node {
            atom_type: AtomType::new(atom_type)?,
            name: name.into(),
        };
        Ok(self.intern(content))
    }

    /// Insert a link over resident atoms, or return the handle of the
    /// identical resident link.
    pub fn add_link(&mut self, atom_type: &str, outgoing: &[Handle]) -> Result<Handle, VaultError> {
        let atom_type = AtomType::new(atom_type)?;
        if let Some(missing) = outgoing.iter().find(|h| !self.contains(**h)) {
            return Err(VaultError::UnknownHandle(*missing));
        }
        Ok(self.intern(Content::Link {
            atom_type,
            outgoing: outgoing.to_vec(),
        }))
    }

    /// Insert a whole content tree, returning the handle of its root.
    pub fn add_atom(&mut self, atom: &Atom) -> Result<Handle, VaultError> {
        let content = match atom {
            Atom::Node { atom_type, name } => Content::Node {
                atom_type: atom_type.clone(),
                name: name.clone(),
            },
            Atom::Link {
                atom_type,
                outgoing,
            } => {
                let children = outgoing
                    .iter()
                    .map(|child| self.add_atom(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Content::Link {
                    atom_type: atom_type.clone(),
                    outgoing: children,
                }
            }
        };
        Ok(self.intern(content))
    }

    /// Find the resident handle for some content.
    #[must_use]
    pub fn lookup(&self, atom: &Atom) -> Option<Handle> {
        let content = match atom {
            Atom::Node { atom_type, name } => Content::Node {
                atom_type: atom_type.clone(),
                name: name.clone(),
            },
            Atom::Link {
                atom_type,
                outgoing,
            } => Content::Link {
                atom_type: atom_type.clone(),
                outgoing: outgoing
                    .iter()
                    .map(|child| self.lookup(child))
                    .collect::<Option<Vec<_>>>()?,
            },
        };
        self.index.get(&content).copied()
    }

    /// Materialize the content tree of a resident atom.
    pub fn atom(&self, handle: Handle) -> Result<Atom, VaultError> {
        match &self.record(handle)?.content {
            Content::Node { atom_type, name } => Ok(Atom::Node {
                atom_type: atom_type.clone(),
                name: name.clone(),
            }),
            Content::Link {
                atom_type,
                outgoing,
            } => Ok(Atom::Link {
                atom_type: atom_type.clone(),
                outgoing: outgoing
                    .iter()
                    .map(|child| self.atom(*child))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
        }
    }

    /// The UUID the backing store reported for this atom, if it was fetched.
    #[must_use]
    pub fn uuid(&self, handle: Handle) -> Option<AtomUuid> {
        self.record(handle).ok().and_then(|r| r.uuid)
    }

    fn intern(&mut self, content: Content) -> Handle {
        if let Some(&handle) = self.index.get(&content) {
            return handle;
        }
        let handle = Handle(self.records.len() as u64);
        self.index.insert(content.clone(), handle);
        self.records.push(AtomRecord::new(content));
        handle
    }

    fn record(&self, handle: Handle) -> Result<&AtomRecord, VaultError> {
        self.records
            .get(handle.0 as usize)
            .ok_or(VaultError::UnknownHandle(handle))
    }

    fn record_mut(&mut self, handle: Handle) -> Result<&mut AtomRecord, VaultError> {
        self.records
            .get_mut(handle.0 as usize)
            .ok_or(VaultError::UnknownHandle(handle))
    }

    // =========================================================================
    // VALUE SLOTS
    // =========================================================================

    /// Set the value of an (atom, key) slot, replacing any previous value.
    pub fn set_value(&mut self, atom: Handle, key: Handle, value: Value) -> Result<(), VaultError> {
        if !self.contains(key) {
            return Err(VaultError::UnknownHandle(key));
        }
        self.record_mut(atom)?.values.insert(key, value);
        Ok(())
    }

    /// Get the current value of an (atom, key) slot.
    #[must_use]
    pub fn get_value(&self, atom: Handle, key: Handle) -> Option<&Value> {
        self.record(atom).ok()?.values.get(&key)
    }

    /// Keys holding a value on this atom, in handle order.
    pub fn keys(&self, atom: Handle) -> Result<Vec<Handle>, VaultError> {
        Ok(self.record(atom)?.values.keys().copied().collect())
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Hand an atom and all its value slots to the backing store.
    ///
    /// Returns once the work is accepted; use [`barrier`](Self::barrier) to
    /// wait for it. A no-op without a backing store.
    pub fn store_atom(&self, handle: Handle) -> Result<(), VaultError> {
        let atom = self.atom(handle)?;
        let Some(store) = self.live_backing()? else {
            return Ok(());
        };
        store.store_atom(&atom)?;
        for (key, value) in &self.record(handle)?.values {
            store.store_value(&atom, &self.atom(*key)?, value)?;
        }
        Ok(())
    }

    /// Hand a single value slot to the backing store.
    ///
    /// A slot without a value is left untouched in the store.
    pub fn store_value(&self, handle: Handle, key: Handle) -> Result<(), VaultError> {
        let atom = self.atom(handle)?;
        let key_atom = self.atom(key)?;
        let Some(store) = self.live_backing()? else {
            return Ok(());
        };
        match self.record(handle)?.values.get(&key) {
            Some(value) => store.store_value(&atom, &key_atom, value),
            None => Ok(()),
        }
    }

    /// Fetch an atom and its persisted values.
    ///
    /// An atom already materialized from the backing store is returned as is.
    /// Otherwise the store is asked; persisted values replace local values
    /// for the same keys, and key atoms that are not resident yet become
    /// resident.
    ///
    /// A resident atom is always returned, whether or not a store is bound
    /// and whether or not the store knows it; a store miss leaves its local
    /// values untouched. `Ok(None)` only for content that is neither
    /// resident nor stored.
    pub fn fetch_atom(&mut self, atom: &Atom) -> Result<Option<Handle>, VaultError> {
        let resident = self.lookup(atom);
        if let Some(handle) = resident {
            if self.record(handle)?.materialized {
                return Ok(Some(handle));
            }
        }
        let Some(store) = self.live_backing()? else {
            return Ok(resident);
        };
        match store.fetch_atom(atom)? {
            Some(stored) => self.install(stored).map(Some),
            None => {
                tracing::debug!(atom = %atom, resident = resident.is_some(), "fetch miss");
                Ok(resident)
            }
        }
    }

    /// Fetch an atom by the UUID its backing store assigned.
    pub fn fetch_uuid(&mut self, uuid: AtomUuid) -> Result<Option<Handle>, VaultError> {
        let Some(store) = self.live_backing()? else {
            return Ok(None);
        };
        match store.fetch_atom_by_uuid(uuid)? {
            Some(stored) => self.install(stored).map(Some),
            None => {
                tracing::debug!(%uuid, "fetch miss");
                Ok(None)
            }
        }
    }

    /// Refresh a single slot from the backing store.
    ///
    /// The persisted value, if any, replaces the local one and is returned.
    pub fn fetch_value(&mut self, handle: Handle, key: Handle) -> Result<Option<Value>, VaultError> {
        let atom = self.atom(handle)?;
        let key_atom = self.atom(key)?;
        let Some(store) = self.live_backing()? else {
            return Ok(self.get_value(handle, key).cloned());
        };
        let fetched = store.fetch_value(&atom, &key_atom)?;
        if let Some(value) = &fetched {
            self.record_mut(handle)?.values.insert(key, value.clone());
        }
        Ok(fetched)
    }

    /// Block until every write handed to the backing store so far is applied
    /// and visible. Returns immediately without a backing store.
    pub fn barrier(&self) -> Result<(), VaultError> {
        match self.live_backing()? {
            Some(store) => store.barrier(),
            None => Ok(()),
        }
    }

    /// Make a fetched record resident and install its values.
    fn install(&mut self, stored: StoredAtom) -> Result<Handle, VaultError> {
        let handle = self.add_atom(&stored.atom)?;
        let mut slots = Vec::with_capacity(stored.values.len());
        for (key, value) in stored.values {
            slots.push((self.add_atom(&key)?, value));
        }
        let record = self.record_mut(handle)?;
        record.uuid = Some(stored.uuid);
        record.materialized = true;
        record.values.extend(slots);
        Ok(handle)
    }
}

// =============================================================================
// TESTS
// =============================================================================
