//! # atomvault - Maintenance CLI
//!
//! ## Usage
//!
//! ```bash
//! # Row counts of the configured database
//! atomvault status
//!
//! # Another database, machine-readable
//! atomvault --uri sqlite://atoms --json-mode status
//!
//! # Inspect one node
//! atomvault show-node --type ConceptNode --name cat
//!
//! # Wipe everything
//! atomvault reset --force
//! ```

use atomvault::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // ATOMVAULT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ATOMVAULT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atomvault=info,atomvault_core=info".into());

    // Logs go to stderr so JSON command output stays clean on stdout.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        println!("atomvault v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
