//! # Value Model
//!
//! Immutable, typed data attached to (atom, key) pairs.
//!
//! Values are not atoms: they carry no identity and are never
//! content-addressed. Equality is structural, so two composites built
//! independently from equal parts are equal.

use crate::VaultError;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// VALUE KIND
// =============================================================================

/// The variant tag of a [`Value`].
///
/// The integer discriminant is the tag persisted by the relational engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    /// Sequence of floating-point numbers.
    Float = 1,
    /// Sequence of strings.
    String = 2,
    /// Sequence of values.
    Link = 3,
}

impl ValueKind {
    /// The persisted integer tag.
    #[must_use]
    pub const fn tag(self) -> i64 {
        self as i64
    }

    /// Map a persisted tag back to a kind.
    pub fn from_tag(tag: i64) -> Result<Self, VaultError> {
        match tag {
            1 => Ok(Self::Float),
            2 => Ok(Self::String),
            3 => Ok(Self::Link),
            other => Err(VaultError::CorruptData(format!(
                "unknown value tag {}",
                other
            ))),
        }
    }

    /// The type name used in textual renderings.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Float => "FloatValue",
            Self::String => "StringValue",
            Self::Link => "LinkValue",
        }
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// An immutable value.
///
/// Composites (`Link`) nest to any depth and may contain the same content at
/// several positions; every position is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Ordered sequence of floating-point numbers.
    Float(Vec<f64>),
    /// Ordered sequence of strings.
    String(Vec<String>),
    /// Ordered sequence of values.
    Link(Vec<Value>),
}

impl Value {
    /// Build a float sequence.
    #[must_use]
    pub fn floats(values: impl Into<Vec<f64>>) -> Self {
        Self::Float(values.into())
    }

    /// Build a string sequence.
    #[must_use]
    pub fn strings<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::String(values.into_iter().map(Into::into).collect())
    }

    /// Build a composite.
    #[must_use]
    pub fn link(values: impl Into<Vec<Value>>) -> Self {
        Self::Link(values.into())
    }

    /// The variant tag.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Link(_) => ValueKind::Link,
        }
    }

    /// Number of elements at the top level.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Link(v) => v.len(),
        }
    }

    /// True when the top-level sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nesting depth: 1 for scalar and text sequences, 1 + deepest element
    /// for composites.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Float(_) | Self::String(_) => 1,
            Self::Link(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.kind().type_name())?;
        match self {
            Self::Float(items) => {
                for x in items {
                    write!(f, " {}", x)?;
                }
            }
            Self::String(items) => {
                for s in items {
                    write!(f, " {:?}", s)?;
                }
            }
            Self::Link(items) => {
                for v in items {
                    write!(f, " {}", v)?;
                }
            }
        }
        f.write_str(")")
    }
}

// =============================================================================
// TESTS
// =============================================================================
