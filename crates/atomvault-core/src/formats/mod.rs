//! # Formats Module
//!
//! Serialization formats for atomvault.
//!
//! This module contains pure transformations only (no I/O):
//! - `value_codec`: whole-value payloads and inline row columns

pub mod value_codec;

pub use value_codec::{PayloadHeader, decode, encode};
