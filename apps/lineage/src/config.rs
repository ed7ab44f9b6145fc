//! # Configuration
//!
//! Optional TOML configuration for the `lineage` binary.
//!
//! ```toml
//! [storage]
//! backend = "redb"        # memory | redb | sqlite
//! path = "lineage.db"
//!
//! [ids]
//! machine_id = 0
//! machine_count = 1
//!
//! [logging]
//! format = "text"         # text | json
//! filter = "lineage=info"
//! ```
//!
//! Every section and key is optional. Command-line flags override the file.

use lineage_core::{BackendKind, Catalog, LineageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Environment variable that overrides `logging.format`.
pub const LOG_FORMAT_ENV: &str = "LINEAGE_LOG_FORMAT";

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub ids: IdsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redb,
            path: PathBuf::from("lineage.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdsConfig {
    pub machine_id: u64,
    pub machine_count: u64,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            machine_id: 0,
            machine_count: 1,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(LineageError::ConfigError(format!(
                "Unknown log format: {} (expected text or json)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "lineage=info,lineage_core=info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Format after applying `LINEAGE_LOG_FORMAT`, when set and valid.
    #[must_use]
    pub fn effective_format(&self, env_value: Option<&str>) -> LogFormat {
        env_value
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.format)
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, LineageError> {
        let config: Self =
            toml::from_str(source).map_err(|e| LineageError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, LineageError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            LineageError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(LineageError::ConfigError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let source = std::fs::read_to_string(path).map_err(|e| {
            LineageError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, backend: Option<BackendKind>, path: Option<PathBuf>) -> Self {
        if let Some(backend) = backend {
            self.storage.backend = backend;
        }
        if let Some(path) = path {
            self.storage.path = path;
        }
        self
    }

    pub fn validate(&self) -> Result<(), LineageError> {
        if self.ids.machine_count == 0 {
            return Err(LineageError::ConfigError(
                "ids.machine_count must be at least 1".to_string(),
            ));
        }
        if self.ids.machine_id >= self.ids.machine_count {
            return Err(LineageError::ConfigError(format!(
                "ids.machine_id {} must be below ids.machine_count {}",
                self.ids.machine_id, self.ids.machine_count
            )));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(LineageError::ConfigError(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Open the catalog this configuration describes.
    pub fn open_catalog(&self) -> Result<Catalog, LineageError> {
        Catalog::open(
            self.storage.backend,
            &self.storage.path,
            self.ids.machine_id,
            self.ids.machine_count,
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
