//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command produces an `Output` carrying both a human-readable text
//! rendering and a JSON document; `--json-mode` picks the latter.

use crate::config::Config;
use lineage_core::{
    BackendKind, Catalog, EdgeId, GroundType, ItemId, ItemKind, LineageError, VersionHistoryDag,
    VersionId,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;

// =============================================================================
// OUTPUT
// =============================================================================

/// Result of one command, renderable as text or JSON.
#[derive(Debug, Clone)]
pub struct Output {
    pub text: String,
    pub json: serde_json::Value,
}

impl Output {
    fn new(text: impl Into<String>, json: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            json,
        }
    }

    #[must_use]
    pub fn render(&self, json_mode: bool) -> String {
        if json_mode {
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        } else {
            self.text.clone()
        }
    }
}

fn to_versions(ids: &[u64]) -> Vec<VersionId> {
    ids.iter().copied().map(VersionId).collect()
}

fn version_list(versions: &[VersionId]) -> String {
    if versions.is_empty() {
        return "(none)".to_string();
    }
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn dag_json(dag: &VersionHistoryDag) -> serde_json::Value {
    serde_json::json!({
        "item_id": dag.item_id(),
        "edges": dag.edges(),
        "leaves": dag.leaves(),
    })
}

fn dag_text(dag: &VersionHistoryDag) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Item {} History", dag.item_id());
    let _ = writeln!(text, "==================");
    let _ = writeln!(text, "Edges: {}", dag.len());
    for edge in dag.edges() {
        let _ = writeln!(text, "  [{}] {} -> {}", edge.id, edge.from_id, edge.to_id);
    }
    let _ = write!(text, "Leaves: {}", version_list(dag.leaves()));
    text
}

// =============================================================================
// INIT & STATUS
// =============================================================================

/// Refuse to clobber an existing database unless forced, then clear it.
pub fn prepare_init(config: &Config, force: bool) -> Result<(), LineageError> {
    let path = &config.storage.path;
    if config.storage.backend == BackendKind::Memory || !path.exists() {
        return Ok(());
    }
    if !force {
        return Err(LineageError::ConfigError(format!(
            "Database already exists at '{}'. Use --force to overwrite.",
            path.display()
        )));
    }
    std::fs::remove_file(path).map_err(|e| {
        LineageError::IoError(format!("Cannot remove '{}': {}", path.display(), e))
    })?;
    tracing::info!(path = %path.display(), "existing database removed");
    Ok(())
}

/// Report a freshly initialized database.
pub fn cmd_init(config: &Config, catalog: &Catalog) -> Output {
    Output::new(
        format!(
            "Initialized new {} database at {}",
            catalog.backend(),
            config.storage.path.display()
        ),
        serde_json::json!({
            "initialized": true,
            "backend": catalog.backend(),
            "database": config.storage.path.to_string_lossy(),
        }),
    )
}

/// Show catalog configuration.
pub fn cmd_status(config: &Config, catalog: &Catalog) -> Output {
    let text = format!(
        "Lineage Catalog Status\n======================\nDatabase: {}\nBackend:  {}\nMachine:  {} of {}",
        config.storage.path.display(),
        catalog.backend(),
        config.ids.machine_id,
        config.ids.machine_count
    );
    Output::new(
        text,
        serde_json::json!({
            "database": config.storage.path.to_string_lossy(),
            "backend": catalog.backend(),
            "machine_id": config.ids.machine_id,
            "machine_count": config.ids.machine_count,
        }),
    )
}

// =============================================================================
// ITEMS & VERSIONS
// =============================================================================

pub fn cmd_create_item(catalog: &Catalog, kind: ItemKind) -> Result<Output, LineageError> {
    let item = catalog.create_item(kind)?;
    Ok(Output::new(
        format!("Created {} item {}", item.kind, item.id),
        serde_json::json!({ "item_id": item.id, "kind": item.kind }),
    ))
}

pub fn cmd_new_version(catalog: &Catalog) -> Result<Output, LineageError> {
    let version = catalog.register_version()?;
    Ok(Output::new(
        format!("Registered version {}", version),
        serde_json::json!({ "version_id": version }),
    ))
}

// =============================================================================
// HISTORY
// =============================================================================

pub fn cmd_update(
    catalog: &Catalog,
    item: u64,
    child: u64,
    parents: &[u64],
) -> Result<Output, LineageError> {
    let dag = catalog
        .item(ItemId(item))?
        .update(VersionId(child), &to_versions(parents))?;
    Ok(Output::new(
        format!(
            "Added version {} to item {}\nLeaves: {}",
            child,
            item,
            version_list(dag.leaves())
        ),
        dag_json(&dag),
    ))
}

pub fn cmd_dag(catalog: &Catalog, item: u64) -> Result<Output, LineageError> {
    let dag = catalog.item(ItemId(item))?.dag()?;
    Ok(Output::new(dag_text(&dag), dag_json(&dag)))
}

pub fn cmd_parents(catalog: &Catalog, item: u64, version: u64) -> Result<Output, LineageError> {
    let parents = catalog
        .item(ItemId(item))?
        .dag()?
        .parents_of(VersionId(version))?;
    Ok(Output::new(
        format!("Parents of {}: {}", version, version_list(&parents)),
        serde_json::json!({ "version_id": version, "parents": parents }),
    ))
}

pub fn cmd_ancestors(catalog: &Catalog, item: u64, version: u64) -> Result<Output, LineageError> {
    let ancestors = catalog
        .item(ItemId(item))?
        .dag()?
        .ancestors(VersionId(version))?;
    Ok(Output::new(
        format!("Ancestors of {}: {}", version, version_list(&ancestors)),
        serde_json::json!({ "version_id": version, "ancestors": ancestors }),
    ))
}

pub fn cmd_successor(catalog: &Catalog, id: u64) -> Result<Output, LineageError> {
    let edge = catalog.successor(EdgeId(id))?;
    Ok(Output::new(
        format!("Successor {}: {} -> {}", edge.id, edge.from_id, edge.to_id),
        serde_json::json!(edge),
    ))
}

// =============================================================================
// TYPED VERSIONS
// =============================================================================

pub fn cmd_node_version(
    catalog: &Catalog,
    node: u64,
    parents: &[u64],
) -> Result<Output, LineageError> {
    let version = catalog.create_node_version(ItemId(node), &to_versions(parents))?;
    Ok(Output::new(
        format!("Created node version {} of node {}", version.id, version.node_id),
        serde_json::json!(version),
    ))
}

pub fn cmd_edge_version(
    catalog: &Catalog,
    edge: u64,
    from: u64,
    to: u64,
    parents: &[u64],
) -> Result<Output, LineageError> {
    let version = catalog.create_edge_version(
        ItemId(edge),
        VersionId(from),
        VersionId(to),
        &to_versions(parents),
    )?;
    Ok(Output::new(
        format!(
            "Created edge version {} of edge {} ({} -> {})",
            version.id, version.edge_id, version.from_node_version_id, version.to_node_version_id
        ),
        serde_json::json!(version),
    ))
}

/// Parse repeated `key=type` arguments.
pub fn parse_attributes(attrs: &[String]) -> Result<BTreeMap<String, GroundType>, LineageError> {
    let mut attributes = BTreeMap::new();
    for attr in attrs {
        let (key, ground_type) = attr.split_once('=').ok_or_else(|| {
            LineageError::SerializationError(format!(
                "Invalid attribute '{}': expected key=type",
                attr
            ))
        })?;
        let key = key.trim();
        if attributes
            .insert(key.to_string(), ground_type.trim().parse()?)
            .is_some()
        {
            return Err(LineageError::SerializationError(format!(
                "Attribute '{}' declared twice",
                key
            )));
        }
    }
    Ok(attributes)
}

pub fn cmd_structure_version(
    catalog: &Catalog,
    structure: u64,
    attrs: &[String],
    parents: &[u64],
) -> Result<Output, LineageError> {
    let attributes = parse_attributes(attrs)?;
    let version =
        catalog.create_structure_version(ItemId(structure), attributes, &to_versions(parents))?;
    Ok(Output::new(
        format!(
            "Created structure version {} of structure {} ({} attributes)",
            version.id,
            version.structure_id,
            version.attributes.len()
        ),
        serde_json::json!(version),
    ))
}

pub fn cmd_show_structure_version(catalog: &Catalog, id: u64) -> Result<Output, LineageError> {
    let version = catalog.retrieve_structure_version(VersionId(id))?;

    let mut text = String::new();
    let _ = writeln!(
        text,
        "Structure version {} of structure {}",
        version.id, version.structure_id
    );
    if version.attributes.is_empty() {
        let _ = writeln!(text, "  (no attributes)");
    }
    for (key, ground_type) in &version.attributes {
        let _ = writeln!(text, "  {}: {}", key, ground_type);
    }

    Ok(Output::new(text.trim_end().to_string(), serde_json::json!(version)))
}
