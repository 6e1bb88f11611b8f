//! Query client seam between the tracker and execution

use lence_core::{extract_placeholders, ExecError, ExecutionResult, Params, QueryTemplate};
use lence_engine::ExecutionGateway;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A page query as the client sees it: its name and the inputs it reads.
/// Never carries SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub name: String,
    pub params: BTreeSet<String>,
}

impl QuerySpec {
    pub fn new(name: impl Into<String>, params: BTreeSet<String>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Derive the spec from SQL text
    pub fn from_sql(name: impl Into<String>, sql: &str) -> Self {
        Self::new(name, extract_placeholders(sql))
    }

    pub fn from_template(template: &QueryTemplate) -> Self {
        Self::from_sql(template.name(), template.sql())
    }
}

/// Everything the tracker needs from the execution side
#[async_trait::async_trait]
pub trait QueryClient: Send + Sync + 'static {
    /// Queries defined by a document
    async fn page_queries(&self, document: &str) -> Result<Vec<QuerySpec>, ExecError>;

    /// Execute one query
    async fn execute(&self, document: &str, query: &str, params: Params) -> Result<ExecutionResult, ExecError>;
}

#[async_trait::async_trait]
impl QueryClient for ExecutionGateway {
    async fn page_queries(&self, document: &str) -> Result<Vec<QuerySpec>, ExecError> {
        self.registry()
            .queries(document)
            .map(|templates| templates.iter().map(|t| QuerySpec::from_template(t)).collect())
            .ok_or_else(ExecError::not_found)
    }

    async fn execute(&self, document: &str, query: &str, params: Params) -> Result<ExecutionResult, ExecError> {
        ExecutionGateway::execute(self, document, query, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_serializes_without_sql() {
        let spec = QuerySpec::from_sql("by_region", "SELECT * FROM t WHERE r = '${inputs.region.value}'");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({"name": "by_region", "params": ["region"]}));
    }
}
