//! # Value Codec
//!
//! Binary encoding for values and for the inline columns of the relational
//! engine.
//!
//! Whole-value format: Header (5 bytes) + postcard-serialized value tree.
//! - 4 bytes: Magic ("AVAL")
//! - 1 byte: Version
//!
//! The postcard body records, for every composite, its element count and
//! then each element with its own variant tag, so the exact sequence
//! (including repeated content at different positions) is rebuilt on decode.
//!
//! Inline column formats are bare postcard sequences (`Vec<f64>`,
//! `Vec<String>`, `Vec<u64>`). Every decoder rejects trailing bytes: a row
//! that does not decode exactly is `CorruptData`, never a shorter value.

use crate::primitives::{FORMAT_VERSION, HEADER_LEN, MAGIC_BYTES, MAX_PAYLOAD_SIZE};
use crate::{Value, VaultError};
use serde::Serialize;
use serde::de::DeserializeOwned;

// =============================================================================
// HEADER
// =============================================================================

/// The header that precedes every whole-value payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PayloadHeader {
    /// Create a header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    /// Validate magic bytes and version.
    pub fn validate(&self) -> Result<(), VaultError> {
        if &self.magic != MAGIC_BYTES {
            return Err(VaultError::CorruptData("invalid magic bytes".to_string()));
        }
        if self.version != FORMAT_VERSION {
            return Err(VaultError::CorruptData(format!(
                "unsupported payload version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() < HEADER_LEN {
            return Err(VaultError::CorruptData(format!(
                "payload too short: {} bytes",
                bytes.len()
            )));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PayloadHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// WHOLE-VALUE PAYLOADS
// =============================================================================

/// Encode a value tree into a self-describing payload.
pub fn encode(value: &Value) -> Result<Vec<u8>, VaultError> {
    let body = to_bytes(value)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&PayloadHeader::new().to_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a payload produced by [`encode`].
///
/// Empty, truncated, oversized or trailing-garbage payloads are
/// `CorruptData`.
pub fn decode(bytes: &[u8]) -> Result<Value, VaultError> {
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(VaultError::CorruptData(format!(
            "payload of {} bytes exceeds limit of {} bytes",
            bytes.len(),
            MAX_PAYLOAD_SIZE
        )));
    }
    let header = PayloadHeader::from_bytes(bytes)?;
    header.validate()?;
    from_exact_bytes(&bytes[HEADER_LEN..], "value")
}

// =============================================================================
// INLINE COLUMN PAYLOADS
// =============================================================================

/// Encode the elements of a float sequence.
pub fn encode_floats(values: &[f64]) -> Result<Vec<u8>, VaultError> {
    to_bytes(&values)
}

/// Decode the elements of a float sequence.
pub fn decode_floats(bytes: &[u8]) -> Result<Vec<f64>, VaultError> {
    from_exact_bytes(bytes, "float sequence")
}

/// Encode the elements of a string sequence.
pub fn encode_strings(values: &[String]) -> Result<Vec<u8>, VaultError> {
    to_bytes(&values)
}

/// Decode the elements of a string sequence.
pub fn decode_strings(bytes: &[u8]) -> Result<Vec<String>, VaultError> {
    from_exact_bytes(bytes, "string sequence")
}

/// Encode an ordered list of row identifiers (outgoing UUIDs or sub-value
/// references).
pub fn encode_ids(ids: &[u64]) -> Result<Vec<u8>, VaultError> {
    to_bytes(&ids)
}

/// Decode an ordered list of row identifiers.
pub fn decode_ids(bytes: &[u8]) -> Result<Vec<u64>, VaultError> {
    from_exact_bytes(bytes, "id list")
}

// =============================================================================
// HELPERS
// =============================================================================

fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, VaultError> {
    postcard::to_allocvec(value).map_err(|e| VaultError::Serialization(e.to_string()))
}

fn from_exact_bytes<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, VaultError> {
    let (decoded, rest) = postcard::take_from_bytes::<T>(bytes)
        .map_err(|e| VaultError::CorruptData(format!("malformed {}: {}", what, e)))?;
    if !rest.is_empty() {
        return Err(VaultError::CorruptData(format!(
            "{} trailing bytes after {}",
            rest.len(),
            what
        )));
    }
    Ok(decoded)
}

// =============================================================================
// TESTS
// =============================================================================
