//! Configuration schema (lence.toml)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kind of engine behind a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// CSV file exposed as a DuckDB view
    Csv,

    /// Parquet file exposed as a DuckDB view
    Parquet,

    /// DuckDB database file
    Duckdb,

    /// PostgreSQL server
    Postgres,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
            Self::Duckdb => "duckdb",
            Self::Postgres => "postgres",
        }
    }

    /// Whether the source is backed by a local file
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::Csv | Self::Parquet | Self::Duckdb)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: SourceKind,

    /// File path for csv, parquet and duckdb sources
    #[serde(default)]
    pub path: Option<String>,

    /// Connection string for postgres sources
    #[serde(default)]
    pub connection: Option<String>,

    /// Use TLS for postgres connections
    #[serde(default)]
    pub tls: bool,

    #[serde(default)]
    pub description: String,
}

impl SourceConfig {
    /// Resolve the file path against the project root
    pub fn resolved_path(&self, project_root: &Path) -> Option<PathBuf> {
        let path = Path::new(self.path.as_deref()?);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(project_root.join(path))
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.kind.is_file_based() && self.path.is_none() {
            return Err(ConfigError::InvalidSource {
                name: name.to_string(),
                reason: format!("{} sources require a path", self.kind),
            });
        }
        if self.kind == SourceKind::Postgres && self.connection.is_none() {
            return Err(ConfigError::InvalidSource {
                name: name.to_string(),
                reason: "postgres sources require a connection string".to_string(),
            });
        }
        Ok(())
    }
}

/// Execution gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-query deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Development mode: pages are re-scanned periodically
    #[serde(default)]
    pub dev: bool,

    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            dev: false,
            refresh_interval_ms: default_refresh_interval_ms(),
            cors_permissive: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the markup documents
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,

    /// Source used by templates without an explicit binding
    #[serde(default)]
    pub default_source: Option<String>,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pages_dir: default_pages_dir(),
            default_source: None,
            execution: ExecutionConfig::default(),
            server: ServerConfig::default(),
            sources: BTreeMap::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, source) in &self.sources {
            source.validate(name)?;
        }

        if let Some(default) = &self.default_source {
            if !self.sources.contains_key(default) {
                return Err(ConfigError::UnknownDefaultSource(default.clone()));
            }
        }

        Ok(())
    }

    /// Pages directory resolved against the project root
    pub fn pages_path(&self) -> PathBuf {
        if self.pages_dir.is_absolute() {
            self.pages_dir.clone()
        } else {
            self.project_root.join(&self.pages_dir)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },

    #[error("Default source '{0}' is not defined")]
    UnknownDefaultSource(String),
}
