//! # atomvault
//!
//! Maintenance CLI for atomvault databases. The binary in `main.rs` only
//! installs logging and dispatches to [`cli::execute`].

pub mod cli;
pub mod config;
