//! Execution gateway
//!
//! `execute(document, query, params)` is the only way SQL reaches a data
//! source. Steps:
//! 1. Look up the template; a missing document and a missing query produce
//!    the same `NotFound`
//! 2. Validate and interpolate the params (`BadRequest` on mismatch)
//! 3. Resolve the template's source binding, or the default source
//!    (`SourceUnavailable` when it cannot be resolved)
//! 4. Run under a deadline (`QueryFailed`, `Timeout`)
//! 5. Normalize the rows into an [`ExecutionResult`]

use crate::interpolate::{self, InterpolateError};
use lence_core::{Config, ExecError, ExecutionResult, Params};
use lence_registry::QueryRegistry;
use lence_sources::{SourceInfo, SourceSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default per-query deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs registered templates against their data sources
#[derive(Clone)]
pub struct ExecutionGateway {
    registry: Arc<QueryRegistry>,
    sources: Arc<SourceSet>,

    /// Used by templates without an explicit source binding
    default_source: Option<String>,

    timeout: Duration,
}

impl ExecutionGateway {
    pub fn new(registry: Arc<QueryRegistry>, sources: Arc<SourceSet>) -> Self {
        Self {
            registry,
            sources,
            default_source: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Apply `default_source` and `[execution]` settings
    pub fn from_config(registry: Arc<QueryRegistry>, sources: Arc<SourceSet>, config: &Config) -> Self {
        let gateway = Self::new(registry, sources).with_timeout(config.execution.timeout());
        match &config.default_source {
            Some(name) => gateway.with_default_source(name.clone()),
            None => gateway,
        }
    }

    pub fn with_default_source(mut self, name: impl Into<String>) -> Self {
        self.default_source = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registered data sources
    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.sources.list()
    }

    pub fn source_info(&self, name: &str) -> Option<SourceInfo> {
        self.sources.info(name).cloned()
    }

    /// Execute a registered query with caller-supplied parameters
    pub async fn execute(&self, document: &str, query: &str, params: &Params) -> Result<ExecutionResult, ExecError> {
        let started = Instant::now();

        let template = self.registry.lookup(document, query).map_err(|miss| {
            tracing::warn!(document, query, reason = miss.as_str(), "query not found");
            ExecError::not_found()
        })?;

        let sql = interpolate::validate(&template, params).map_err(|err| match err {
            InterpolateError::Params(err) => {
                tracing::warn!(document, query, error = %err, "parameter mismatch");
                ExecError::bad_request(&err)
            }
            InterpolateError::Unresolved(input) => {
                tracing::error!(document, query, input = %input, "placeholder left after interpolation");
                ExecError::query_failed("Internal error preparing query")
            }
            InterpolateError::DollarQuoted(input) => {
                tracing::error!(document, query, input = %input, "placeholder inside dollar-quoted body");
                ExecError::query_failed("Internal error preparing query")
            }
        })?;

        let binding = template.source().or(self.default_source.as_deref());
        let Some(source) = binding.and_then(|name| self.sources.resolve(name)) else {
            tracing::warn!(
                document,
                query,
                source = binding.unwrap_or("<none>"),
                "data source unavailable"
            );
            return Err(ExecError::source_unavailable());
        };

        let raw = match tokio::time::timeout(self.timeout, source.run(&sql)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) if err.is_unavailable() => {
                tracing::warn!(document, query, source = source.name(), error = %err, "data source unavailable");
                return Err(ExecError::source_unavailable());
            }
            Ok(Err(err)) => {
                tracing::warn!(document, query, source = source.name(), error = %err, "query failed");
                return Err(ExecError::query_failed(err.message()));
            }
            Err(_) => {
                tracing::warn!(
                    document,
                    query,
                    source = source.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "query timed out"
                );
                return Err(ExecError::timeout());
            }
        };

        let result = raw.into_result().map_err(|err| {
            tracing::error!(document, query, source = source.name(), error = %err, "malformed result");
            ExecError::query_failed("Malformed result from data source")
        })?;

        tracing::debug!(
            document,
            query,
            source = source.name(),
            rows = result.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "executed query"
        );

        Ok(result)
    }
}
