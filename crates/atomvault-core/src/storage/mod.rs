//! # Storage Engines
//!
//! Implementations of [`crate::BackingStore`].
//!
//! - `memory`: in-process engine, synchronous writes
//! - `sql`: relational engine (SQLite) with a write-back queue

pub mod memory;
pub mod sql;

pub use memory::MemoryStorage;
pub use sql::SqlStorage;

use serde::Serialize;

/// Row counts of a storage engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub atoms: u64,
    pub valuations: u64,
    pub value_parts: u64,
}
