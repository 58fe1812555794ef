//! # CLI Command Implementations
//!
//! Every command opens its own store and closes it (draining queued writes)
//! before returning.

use super::Target;
use crate::config::{AppConfig, write_config};
use atomvault_core::{Atom, AtomSpace, BackingStore, SqlStorage, VaultError};
use std::path::Path;
use std::sync::Arc;

/// Open the store a target names.
pub fn open_store(target: &Target) -> Result<SqlStorage, VaultError> {
    SqlStorage::open(&target.descriptor, &target.storage)
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show connection state and row counts.
pub fn cmd_status(target: &Target, json_mode: bool) -> Result<(), VaultError> {
    let store = open_store(target)?;
    let stats = store.stats()?;

    if json_mode {
        print_json(&serde_json::json!({
            "descriptor": target.descriptor.to_string(),
            "path": store.path().to_string_lossy(),
            "connected": store.connected(),
            "atoms": stats.atoms,
            "valuations": stats.valuations,
            "value_parts": stats.value_parts,
        }));
        return Ok(());
    }

    println!("atomvault Status");
    println!("================");
    println!("Descriptor:  {}", target.descriptor);
    println!("Database:    {}", store.path().display());
    println!("Connected:   {}", store.connected());
    println!();
    println!("Atoms:       {}", stats.atoms);
    println!("Valuations:  {}", stats.valuations);
    println!("Value parts: {}", stats.value_parts);

    Ok(())
}

// =============================================================================
// RESET COMMAND
// =============================================================================

/// Delete every atom and value.
pub fn cmd_reset(target: &Target, json_mode: bool, force: bool) -> Result<(), VaultError> {
    if !force {
        return Err(VaultError::Io(
            "reset deletes every atom and value; pass --force to confirm".to_string(),
        ));
    }

    let store = open_store(target)?;
    let before = store.stats()?;
    store.reset()?;

    if json_mode {
        print_json(&serde_json::json!({
            "descriptor": target.descriptor.to_string(),
            "reset": true,
            "atoms_removed": before.atoms,
            "valuations_removed": before.valuations,
        }));
    } else {
        println!(
            "Reset {}: removed {} atoms and {} values",
            target.descriptor, before.atoms, before.valuations
        );
    }
    Ok(())
}

// =============================================================================
// SHOW-NODE COMMAND
// =============================================================================

/// Fetch a node and print its UUID and values.
pub fn cmd_show_node(
    target: &Target,
    json_mode: bool,
    atom_type: &str,
    name: &str,
) -> Result<(), VaultError> {
    let atom = Atom::node(atom_type, name)?;
    let store: Arc<dyn BackingStore> = Arc::new(open_store(target)?);
    let mut space = AtomSpace::with_backing(store);

    let Some(handle) = space.fetch_atom(&atom)? else {
        if json_mode {
            print_json(&serde_json::json!({ "atom": atom.to_string(), "found": false }));
        } else {
            println!("{}: not found", atom);
        }
        return Ok(());
    };

    let uuid = space.uuid(handle).map(|u| u.0);
    let mut values = Vec::new();
    for key in space.keys(handle)? {
        if let Some(value) = space.get_value(handle, key) {
            values.push((space.atom(key)?.to_string(), value.to_string()));
        }
    }

    if json_mode {
        let values: Vec<_> = values
            .iter()
            .map(|(key, value)| serde_json::json!({ "key": key, "value": value }))
            .collect();
        print_json(&serde_json::json!({
            "atom": atom.to_string(),
            "found": true,
            "uuid": uuid,
            "values": values,
        }));
        return Ok(());
    }

    match uuid {
        Some(uuid) => println!("{}  uuid={}", atom, uuid),
        None => println!("{}", atom),
    }
    if values.is_empty() {
        println!("  (no values)");
    }
    for (key, value) in &values {
        println!("  {} => {}", key, value);
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Write a configuration file.
pub fn cmd_init(path: &Path, config: &AppConfig, force: bool) -> Result<(), VaultError> {
    write_config(path, config, force)?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
