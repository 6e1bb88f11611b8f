//! Mock data source for testing
//!
//! Returns canned results keyed by the exact SQL it receives, without any
//! engine behind it. It's useful for:
//! - Unit testing the execution gateway and reactive tracker
//! - HTTP tests of the server routes
//! - Simulating engine failures and slow queries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lence_sources::{MockSource, RawResult, Source};
//!
//! let source = MockSource::new("orders");
//! source.add_result("SELECT 1", RawResult::new(columns, rows)).await;
//!
//! let raw = source.run("SELECT 1").await?;
//! assert_eq!(source.executed_sql().await, vec!["SELECT 1"]);
//! ```

use crate::source::{RawResult, Source, SourceError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock data source
///
/// Clones share canned results and the execution log.
pub struct MockSource {
    name: String,

    /// Canned results by exact SQL text
    results: Arc<RwLock<HashMap<String, RawResult>>>,

    /// Errors to return for specific SQL text
    errors: Arc<RwLock<HashMap<String, SourceError>>>,

    /// Returned when no canned result matches
    fallback: Option<RawResult>,

    /// Every statement received, in order
    executed: Arc<RwLock<Vec<String>>>,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,
}

impl MockSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            fallback: None,
            executed: Arc::new(RwLock::new(Vec::new())),
            latency_ms: 0,
        }
    }

    /// Return `result` when exactly `sql` is run
    pub async fn add_result(&self, sql: impl Into<String>, result: RawResult) {
        self.results.write().await.insert(sql.into(), result);
    }

    /// Fail with `error` when exactly `sql` is run
    pub async fn add_error(&self, sql: impl Into<String>, error: SourceError) {
        self.errors.write().await.insert(sql.into(), error);
    }

    /// Result for any statement without a canned entry
    pub fn with_fallback(mut self, result: RawResult) -> Self {
        self.fallback = Some(result);
        self
    }

    /// Delay every run by `latency_ms`
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Statements received so far
    pub async fn executed_sql(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    pub async fn execution_count(&self) -> usize {
        self.executed.read().await.len()
    }

    pub async fn clear_executed(&self) {
        self.executed.write().await.clear();
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Clone for MockSource {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            results: Arc::clone(&self.results),
            errors: Arc::clone(&self.errors),
            fallback: self.fallback.clone(),
            executed: Arc::clone(&self.executed),
            latency_ms: self.latency_ms,
        }
    }
}

#[async_trait::async_trait]
impl Source for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, sql: &str) -> Result<RawResult, SourceError> {
        self.executed.write().await.push(sql.to_string());
        self.simulate_latency().await;

        if let Some(error) = self.errors.read().await.get(sql) {
            return Err(error.clone());
        }

        if let Some(result) = self.results.read().await.get(sql) {
            return Ok(result.clone());
        }

        self.fallback
            .clone()
            .ok_or_else(|| SourceError::Query(format!("no canned result on mock source {}", self.name)))
    }
}

/// Builder for creating a MockSource with canned results
///
/// # Example
///
/// ```rust,ignore
/// let source = MockSourceBuilder::new("orders")
///     .with_result("SELECT 1", one)
///     .with_error("SELECT boom", SourceError::Query("boom".into()))
///     .with_latency(50)
///     .build();
/// ```
pub struct MockSourceBuilder {
    name: String,
    results: HashMap<String, RawResult>,
    errors: HashMap<String, SourceError>,
    fallback: Option<RawResult>,
    latency_ms: u64,
}

impl MockSourceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: HashMap::new(),
            errors: HashMap::new(),
            fallback: None,
            latency_ms: 0,
        }
    }

    pub fn with_result(mut self, sql: impl Into<String>, result: RawResult) -> Self {
        self.results.insert(sql.into(), result);
        self
    }

    pub fn with_error(mut self, sql: impl Into<String>, error: SourceError) -> Self {
        self.errors.insert(sql.into(), error);
        self
    }

    pub fn with_fallback(mut self, result: RawResult) -> Self {
        self.fallback = Some(result);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn build(self) -> MockSource {
        MockSource {
            name: self.name,
            results: Arc::new(RwLock::new(self.results)),
            errors: Arc::new(RwLock::new(self.errors)),
            fallback: self.fallback,
            executed: Arc::new(RwLock::new(Vec::new())),
            latency_ms: self.latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lence_core::ColumnInfo;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn one_row() -> RawResult {
        RawResult::new(vec![ColumnInfo::new("n", "INTEGER")], vec![vec![json!(1)]])
    }

    #[tokio::test]
    async fn returns_canned_result_and_logs_sql() {
        let source = MockSource::new("orders");
        source.add_result("SELECT 1", one_row()).await;

        let raw = source.run("SELECT 1").await.unwrap();
        assert_eq!(raw, one_row());
        assert_eq!(source.executed_sql().await, vec!["SELECT 1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_sql_fails_without_fallback() {
        let source = MockSource::new("orders");
        assert!(matches!(source.run("SELECT 2").await, Err(SourceError::Query(_))));

        let source = MockSource::new("orders").with_fallback(one_row());
        assert_eq!(source.run("SELECT 2").await.unwrap(), one_row());
    }

    #[tokio::test]
    async fn injected_error_wins() {
        let source = MockSourceBuilder::new("orders")
            .with_result("SELECT 1", one_row())
            .with_error("SELECT 1", SourceError::Connection("refused".into()))
            .build();

        assert_eq!(
            source.run("SELECT 1").await.unwrap_err(),
            SourceError::Connection("refused".into())
        );
    }

    #[tokio::test]
    async fn clones_share_log() {
        let source = MockSource::new("orders").with_fallback(one_row());
        let clone = source.clone();
        clone.run("SELECT 3").await.unwrap();

        assert_eq!(source.execution_count().await, 1);
        source.clear_executed().await;
        assert_eq!(clone.execution_count().await, 0);
    }

    #[tokio::test]
    async fn latency_is_applied() {
        let source = MockSource::new("slow").with_fallback(one_row()).with_latency(30);
        let start = std::time::Instant::now();
        source.run("SELECT 1").await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(30));
    }
}
