//! # Lineage CLI Module
//!
//! This module implements the CLI interface for the lineage catalog.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `create-item` - Register a node, edge or structure
//! - `new-version` - Register an opaque version
//! - `update` - Add a version to an item's history
//! - `dag` - Show an item's full history
//! - `parents` / `ancestors` - Walk an item's history upwards
//! - `successor` - Resolve a succession edge
//! - `node-version` / `edge-version` / `structure-version` - Typed versions
//! - `show-structure-version` - Show a structure version's schema

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use lineage_core::{BackendKind, ItemKind, LineageError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Lineage - version history catalog
///
/// Tracks every node, edge and structure of a provenance graph as a DAG of
/// immutable versions.
#[derive(Parser, Debug)]
#[command(name = "lineage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the catalog database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: memory, redb or sqlite (overrides the config file)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<BackendKind>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Remove an existing database first
        #[arg(short, long)]
        force: bool,
    },

    /// Register a new item
    CreateItem {
        /// Item kind (node, edge, structure)
        #[arg(short, long)]
        kind: ItemKind,
    },

    /// Register a new opaque version
    NewVersion,

    /// Add a version to an item's history
    Update {
        /// Item ID
        #[arg(short, long)]
        item: u64,

        /// Version to add
        #[arg(long)]
        child: u64,

        /// Parent version (repeatable; none means a new root)
        #[arg(short, long)]
        parent: Vec<u64>,
    },

    /// Show an item's history
    Dag {
        /// Item ID
        #[arg(short, long)]
        item: u64,
    },

    /// Show the direct parents of a version
    Parents {
        #[arg(short, long)]
        item: u64,

        #[arg(long)]
        version: u64,
    },

    /// Show every ancestor of a version, nearest first
    Ancestors {
        #[arg(short, long)]
        item: u64,

        #[arg(long)]
        version: u64,
    },

    /// Resolve a succession edge
    Successor {
        /// Edge ID
        #[arg(long)]
        id: u64,
    },

    /// Create a node version
    NodeVersion {
        /// Node item ID
        #[arg(short, long)]
        node: u64,

        #[arg(short, long)]
        parent: Vec<u64>,
    },

    /// Create an edge version between two node versions
    EdgeVersion {
        /// Edge item ID
        #[arg(short, long)]
        edge: u64,

        /// Source node version
        #[arg(long)]
        from: u64,

        /// Target node version
        #[arg(long)]
        to: u64,

        #[arg(short, long)]
        parent: Vec<u64>,
    },

    /// Create a structure version
    StructureVersion {
        /// Structure item ID
        #[arg(short, long)]
        structure: u64,

        /// Attribute as key=type (repeatable)
        #[arg(short, long)]
        attr: Vec<String>,

        #[arg(short, long)]
        parent: Vec<u64>,
    },

    /// Show a structure version and its attributes
    ShowStructureVersion {
        /// Structure version ID
        #[arg(long)]
        id: u64,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

impl Cli {
    /// Load the configuration file (if any) and apply flag overrides.
    pub fn resolve_config(&self) -> Result<Config, LineageError> {
        Ok(Config::load(self.config.as_deref())?
            .with_overrides(self.backend, self.database.clone()))
    }
}

/// Execute the CLI with parsed arguments and a resolved configuration.
///
/// Returns the rendered output.
pub fn execute(cli: Cli, config: &Config) -> Result<String, LineageError> {
    let json_mode = cli.json_mode;

    if let Some(Commands::Init { force }) = &cli.command {
        prepare_init(config, *force)?;
    }
    let catalog = config.open_catalog()?;

    let output = match cli.command {
        Some(Commands::Init { .. }) => cmd_init(config, &catalog),
        Some(Commands::CreateItem { kind }) => cmd_create_item(&catalog, kind)?,
        Some(Commands::NewVersion) => cmd_new_version(&catalog)?,
        Some(Commands::Update {
            item,
            child,
            parent,
        }) => cmd_update(&catalog, item, child, &parent)?,
        Some(Commands::Dag { item }) => cmd_dag(&catalog, item)?,
        Some(Commands::Parents { item, version }) => cmd_parents(&catalog, item, version)?,
        Some(Commands::Ancestors { item, version }) => cmd_ancestors(&catalog, item, version)?,
        Some(Commands::Successor { id }) => cmd_successor(&catalog, id)?,
        Some(Commands::NodeVersion { node, parent }) => {
            cmd_node_version(&catalog, node, &parent)?
        }
        Some(Commands::EdgeVersion {
            edge,
            from,
            to,
            parent,
        }) => cmd_edge_version(&catalog, edge, from, to, &parent)?,
        Some(Commands::StructureVersion {
            structure,
            attr,
            parent,
        }) => cmd_structure_version(&catalog, structure, &attr, &parent)?,
        Some(Commands::ShowStructureVersion { id }) => cmd_show_structure_version(&catalog, id)?,
        None => {
            // No subcommand - show status by default
            cmd_status(config, &catalog)
        }
    };

    Ok(output.render(json_mode))
}
