//! # Core Type Definitions
//!
//! This module contains the identity and content types shared by every layer:
//! - Atom content (`AtomType`, `Atom`)
//! - Identity tokens (`Handle`, `AtomUuid`)
//! - Error types (`VaultError`)
//!
//! ## Content Addressing
//!
//! `Atom` describes content only. Two atoms built independently from the same
//! type and name (or the same type and outgoing sequence) compare equal, hash
//! equal and order equal, which is what lets both the AtomSpace and the
//! storage engines key their tables by content.

use crate::primitives::MAX_TYPE_NAME_LENGTH;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Local identity token for an atom resident in one AtomSpace.
///
/// Handles are arena indices: they are only meaningful inside the AtomSpace
/// that issued them and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub u64);

/// Globally unique identifier assigned to an atom by a backing store.
///
/// A UUID is minted once per distinct content and never reassigned for the
/// lifetime of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AtomUuid(pub u64);

impl fmt::Display for AtomUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ATOM TYPE
// =============================================================================

/// Name of an atom type, e.g. `ConceptNode` or `ListLink`.
///
/// The set of type names belongs to the type generator and is open; only the
/// lexical shape is checked here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AtomType(String);

impl AtomType {
    /// Create a validated atom type.
    ///
    /// Type names must be non-empty, at most `MAX_TYPE_NAME_LENGTH` bytes,
    /// and consist of ASCII alphanumerics or `_`.
    pub fn new(name: impl Into<String>) -> Result<Self, VaultError> {
        let name = name.into();
        if name.is_empty() {
            return Err(VaultError::InvalidAtom("empty atom type".to_string()));
        }
        if name.len() > MAX_TYPE_NAME_LENGTH {
            return Err(VaultError::InvalidAtom(format!(
                "atom type longer than {} bytes",
                MAX_TYPE_NAME_LENGTH
            )));
        }
        if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(VaultError::InvalidAtom(format!(
                "atom type '{}' contains invalid characters",
                name
            )));
        }
        Ok(Self(name))
    }

    /// Get the type name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ATOM CONTENT
// =============================================================================

/// The content of an atom, independent of any process or store.
///
/// This is the form in which atoms cross the backing-store boundary: a link
/// carries its whole outgoing tree so a store in another process can resolve
/// it without sharing local handles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Atom {
    /// A named atom.
    Node {
        /// The node type.
        atom_type: AtomType,
        /// The node name.
        name: String,
    },
    /// An ordered sequence of atoms.
    Link {
        /// The link type.
        atom_type: AtomType,
        /// The ordered outgoing set.
        outgoing: Vec<Atom>,
    },
}

impl Atom {
    /// Build node content, validating the type.
    pub fn node(atom_type: &str, name: impl Into<String>) -> Result<Self, VaultError> {
        Ok(Self::Node {
            atom_type: AtomType::new(atom_type)?,
            name: name.into(),
        })
    }

    /// Build link content, validating the type.
    pub fn link(atom_type: &str, outgoing: Vec<Atom>) -> Result<Self, VaultError> {
        Ok(Self::Link {
            atom_type: AtomType::new(atom_type)?,
            outgoing,
        })
    }

    /// The atom's type.
    #[must_use]
    pub fn atom_type(&self) -> &AtomType {
        match self {
            Self::Node { atom_type, .. } | Self::Link { atom_type, .. } => atom_type,
        }
    }

    /// True for nodes.
    #[must_use]
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node { .. })
    }

    /// The node name, or `None` for links.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Node { name, .. } => Some(name),
            Self::Link { .. } => None,
        }
    }

    /// The outgoing set (empty for nodes).
    #[must_use]
    pub fn outgoing(&self) -> &[Atom] {
        match self {
            Self::Node { .. } => &[],
            Self::Link { outgoing, .. } => outgoing,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node { atom_type, name } => write!(f, "({} {:?})", atom_type, name),
            Self::Link {
                atom_type,
                outgoing,
            } => {
                write!(f, "({}", atom_type)?;
                for child in outgoing {
                    write!(f, " {}", child)?;
                }
                f.write_str(")")
            }
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in atomvault.
///
/// Structural errors (`InvalidAtom`, `UnknownHandle`, `InvalidDescriptor`)
/// are returned by the call that introduced them. I/O errors from queued
/// writes are deferred to the next synchronization point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The backing connection could not be established or is closed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stored data could not be decoded into a well-formed atom or value.
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// A queued write could not be applied.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// Atom content is malformed.
    #[error("Invalid atom: {0}")]
    InvalidAtom(String),

    /// The handle does not refer to a resident atom.
    #[error("Unknown handle: {0:?}")]
    UnknownHandle(Handle),

    /// The connection descriptor could not be parsed.
    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// A value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================
