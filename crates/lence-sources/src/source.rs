//! Source trait for executing SQL against a named engine

use lence_core::{ColumnInfo, ExecutionResult, ShapeError};

/// Rows as returned by an engine, before normalization
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RawResult {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    /// Normalize into the uniform result shape
    pub fn into_result(self) -> Result<ExecutionResult, ShapeError> {
        ExecutionResult::new(self.columns, self.rows)
    }
}

/// Errors that can occur when running SQL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The engine rejected or failed the statement
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} support not compiled. Rebuild with: cargo build --features {0}")]
    NotCompiled(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SourceError {
    /// Whether the failure lies with the source itself rather than the SQL
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Config(_) | Self::NotCompiled(_))
    }

    /// Engine message without the category prefix
    pub fn message(&self) -> String {
        match self {
            Self::Query(msg) | Self::Connection(msg) | Self::Config(msg) | Self::Internal(msg) => msg.clone(),
            Self::NotCompiled(_) => self.to_string(),
        }
    }
}

/// A tabular query executor bound to a data source name
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// Configured source name
    fn name(&self) -> &str;

    /// Engine name (e.g. "duckdb", "postgres")
    fn engine(&self) -> &'static str;

    /// Run a fully interpolated SQL statement
    async fn run(&self, sql: &str) -> Result<RawResult, SourceError>;
}
