//! # atomvault-core
//!
//! Persistence for a content-addressed hypergraph.
//!
//! This crate holds the whole data path:
//! - `types`, `value`: the atom and value model
//! - `atomspace`: the in-memory hypergraph with per-atom value slots
//! - `backing`: the boundary every persistence engine implements
//! - `storage`: the in-process and relational (SQLite) engines
//! - `formats`: value codecs shared by the engines
//!
//! ## Consistency Model
//!
//! Writes handed to a backing store may apply asynchronously. A barrier is
//! the only synchronization point: once it returns, every write accepted
//! before it is durable and visible to any fetch on the same database, and
//! any failure among those writes has been reported.

// =============================================================================
// MODULES
// =============================================================================

pub mod atomspace;
pub mod backing;
pub mod config;
pub mod formats;
pub mod primitives;
pub mod storage;
pub mod types;
pub mod value;

// =============================================================================
// RE-EXPORTS: Model
// =============================================================================

pub use types::{Atom, AtomType, AtomUuid, Handle, VaultError};
pub use value::{Value, ValueKind};

// =============================================================================
// RE-EXPORTS: Hypergraph & Storage
// =============================================================================

pub use atomspace::AtomSpace;
pub use backing::{BackingStore, StoredAtom};
pub use config::{ConnectionDescriptor, Driver, StorageConfig};
pub use storage::{MemoryStorage, SqlStorage, StoreStats};

// =============================================================================
// RE-EXPORTS: Formats
// =============================================================================

pub use formats::{PayloadHeader, decode, encode};
