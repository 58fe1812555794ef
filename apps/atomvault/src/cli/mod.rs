//! # atomvault CLI Module
//!
//! ## Available Commands
//!
//! - `status` - Show connection state and row counts
//! - `reset` - Delete every atom and value (requires `--force`)
//! - `show-node` - Fetch a node and print its values
//! - `init` - Write a default configuration file

mod commands;

use crate::config::{AppConfig, load_config};
use atomvault_core::{ConnectionDescriptor, StorageConfig, VaultError};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// atomvault - hypergraph persistence maintenance
#[derive(Parser, Debug)]
#[command(name = "atomvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Connection descriptor, e.g. sqlite://atoms (overrides the config file)
    #[arg(short, long, global = true)]
    pub uri: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show connection state and row counts
    Status,

    /// Delete every atom and value; tables stay in place
    Reset {
        /// Confirm the destructive reset
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch a node and print its UUID and values
    ShowNode {
        /// Atom type, e.g. ConceptNode
        #[arg(short = 't', long = "type")]
        atom_type: String,

        /// Node name
        #[arg(short, long)]
        name: String,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

/// Where to connect, resolved from flags and the config file.
#[derive(Debug, Clone)]
pub struct Target {
    pub descriptor: ConnectionDescriptor,
    pub storage: StorageConfig,
}

impl Target {
    pub fn resolve(cli: &Cli) -> Result<Self, VaultError> {
        let config = load_config(cli.config.as_deref())?.unwrap_or_default();
        let uri = config.resolve_uri(cli.uri.as_deref());
        Ok(Self {
            descriptor: ConnectionDescriptor::parse(&uri)?,
            storage: config.storage,
        })
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), VaultError> {
    let json_mode = cli.json_mode;

    match &cli.command {
        Some(Commands::Init { force }) => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(crate::config::default_config_path);
            cmd_init(&path, &AppConfig::default(), *force)
        }
        Some(Commands::Reset { force }) => cmd_reset(&Target::resolve(&cli)?, json_mode, *force),
        Some(Commands::ShowNode { atom_type, name }) => {
            cmd_show_node(&Target::resolve(&cli)?, json_mode, atom_type, name)
        }
        Some(Commands::Status) | None => cmd_status(&Target::resolve(&cli)?, json_mode),
    }
}
