//! # Lineage - Version History Catalog
//!
//! The main binary for the lineage catalog.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          apps/lineage (THE BINARY)           │
//! │                                              │
//! │  ┌──────────┐  ┌──────────┐  ┌───────────┐  │
//! │  │   CLI    │  │  Config  │  │  Logging  │  │
//! │  │  (clap)  │  │  (toml)  │  │ (tracing) │  │
//! │  └────┬─────┘  └────┬─────┘  └───────────┘  │
//! │       └──────┬──────┘                        │
//! │              ▼                               │
//! │      ┌───────────────┐                       │
//! │      │ lineage-core  │                       │
//! │      │  (THE LOGIC)  │                       │
//! │      └───────────────┘                       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! lineage -B sqlite -D catalog.sqlite init
//! lineage create-item --kind node
//! lineage new-version
//! lineage update --item 1 --child 2
//! lineage dag --item 1 --json-mode
//! ```

use clap::Parser;
use lineage::{cli, logging};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    // Initialize tracing. LINEAGE_LOG_FORMAT=json switches to JSON lines.
    logging::init(&config.logging);

    match cli::execute(cli, &config) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
