//! # Innate Primitives
//!
//! Compile-time constants shared by the codec, the AtomSpace and the
//! storage engines.
//!
//! These values are fixed at build time. Tuning knobs that operators may
//! change live in [`crate::config::StorageConfig`] instead.

/// Magic bytes for the whole-value payload header.
///
/// - Payload = Magic Bytes ("AVAL") + Version (u8) + postcard body.
pub const MAGIC_BYTES: &[u8; 4] = b"AVAL";

/// Current value payload format version.
///
/// Increment this when making breaking changes to the payload format.
pub const FORMAT_VERSION: u8 = 1;

/// Length of the payload header (magic + version).
pub const HEADER_LEN: usize = 5;

/// Maximum accepted size of a single encoded value payload.
///
/// Checked before deserialization so a corrupted length can never drive a
/// huge allocation.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024; // 64 MB

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of an atom type name in bytes.
pub const MAX_TYPE_NAME_LENGTH: usize = 128;

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default number of writer threads (and writer connections) in the
/// relational engine.
pub const DEFAULT_WORKERS: usize = 4;

/// Default bound on queued, not yet applied writes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Default time a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// File extension appended to the database name for SQLite descriptors.
pub const SQLITE_FILE_EXTENSION: &str = "sqlite";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"AVAL");
        assert_eq!(HEADER_LEN, MAGIC_BYTES.len() + 1);
    }

    #[test]
    fn defaults_are_usable() {
        assert!(DEFAULT_WORKERS > 0);
        assert!(DEFAULT_QUEUE_CAPACITY > 0);
    }
}
