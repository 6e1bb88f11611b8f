//! Registered data sources and binding resolution

use crate::duckdb::DuckDbEngine;
use crate::postgres::PostgresSource;
use crate::source::{Source, SourceError};
use lence_core::{Config, SourceConfig, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Public metadata about a data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: SourceKind,

    pub description: String,
}

impl SourceInfo {
    pub fn new(name: impl Into<String>, kind: SourceKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
        }
    }

    fn from_config(name: &str, config: &SourceConfig) -> Self {
        Self::new(name, config.kind, config.description.clone())
    }
}

struct Registered {
    info: SourceInfo,
    source: Arc<dyn Source>,
}

/// The set of sources queries may be bound to
///
/// Only sources that were set up successfully are registered; anything else
/// is unresolvable.
#[derive(Default)]
pub struct SourceSet {
    sources: BTreeMap<String, Registered>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `info.name`, replacing any previous one
    pub fn insert(&mut self, info: SourceInfo, source: Arc<dyn Source>) {
        self.sources.insert(info.name.clone(), Registered { info, source });
    }

    /// Builder form of [`SourceSet::insert`]
    pub fn with_source(mut self, info: SourceInfo, source: Arc<dyn Source>) -> Self {
        self.insert(info, source);
        self
    }

    /// Look up the executor for a source binding
    pub fn resolve(&self, binding: &str) -> Option<Arc<dyn Source>> {
        self.sources.get(binding).map(|r| Arc::clone(&r.source))
    }

    pub fn info(&self, name: &str) -> Option<&SourceInfo> {
        self.sources.get(name).map(|r| &r.info)
    }

    /// All registered sources, ordered by name
    pub fn list(&self) -> Vec<SourceInfo> {
        self.sources.values().map(|r| r.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Set up every configured source
    ///
    /// A source that fails to open, or whose engine is not compiled in, is
    /// logged and left out. Queries bound to it fail as unavailable.
    pub async fn from_config(config: &Config) -> Self {
        let mut set = Self::new();

        let needs_views = config
            .sources
            .values()
            .any(|s| matches!(s.kind, SourceKind::Csv | SourceKind::Parquet));
        let views = if needs_views {
            match DuckDbEngine::in_memory() {
                Ok(engine) => Some(engine),
                Err(err) => {
                    tracing::warn!(error = %err, "file sources disabled");
                    None
                }
            }
        } else {
            None
        };

        for (name, source) in &config.sources {
            match open(name, source, &config.project_root, views.as_ref()).await {
                Ok(handle) => {
                    tracing::info!(source = %name, kind = %source.kind, "registered data source");
                    set.insert(SourceInfo::from_config(name, source), handle);
                }
                Err(err) => {
                    tracing::warn!(source = %name, kind = %source.kind, error = %err, "data source unavailable");
                }
            }
        }

        set
    }
}

async fn open(
    name: &str,
    config: &SourceConfig,
    project_root: &Path,
    views: Option<&DuckDbEngine>,
) -> Result<Arc<dyn Source>, SourceError> {
    match config.kind {
        SourceKind::Csv | SourceKind::Parquet => {
            let path = config
                .resolved_path(project_root)
                .ok_or_else(|| SourceError::Config(format!("{} sources require a path", config.kind)))?;
            let engine = views.ok_or(SourceError::NotCompiled("duckdb"))?;
            Ok(Arc::new(engine.register_view(name, config.kind, &path)?))
        }
        SourceKind::Duckdb => {
            let path = config
                .resolved_path(project_root)
                .ok_or_else(|| SourceError::Config("duckdb sources require a path".to_string()))?;
            Ok(Arc::new(DuckDbEngine::open(&path)?.source(name)))
        }
        SourceKind::Postgres => {
            let conn_str = config
                .connection
                .as_deref()
                .ok_or_else(|| SourceError::Config("postgres sources require a connection string".to_string()))?;
            Ok(Arc::new(PostgresSource::connect(name, conn_str, config.tls).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSource;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve_registered_source() {
        let set = SourceSet::new().with_source(
            SourceInfo::new("orders", SourceKind::Csv, "Order lines"),
            Arc::new(MockSource::new("orders")),
        );

        assert_eq!(set.resolve("orders").unwrap().name(), "orders");
        assert!(set.resolve("missing").is_none());
        assert_eq!(set.info("orders").unwrap().description, "Order lines");
    }

    #[test]
    fn list_is_sorted() {
        let set = SourceSet::new()
            .with_source(SourceInfo::new("b", SourceKind::Csv, ""), Arc::new(MockSource::new("b")))
            .with_source(SourceInfo::new("a", SourceKind::Parquet, ""), Arc::new(MockSource::new("a")));

        let names: Vec<_> = set.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn info_serializes_kind_as_type() {
        let info = SourceInfo::new("orders", SourceKind::Csv, "Order lines");
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({"name": "orders", "type": "csv", "description": "Order lines"})
        );
    }

    #[cfg(not(feature = "duckdb"))]
    #[tokio::test]
    async fn uncompiled_engines_leave_sources_unresolvable() {
        let config = Config::from_toml(
            r#"
            [sources.orders]
            type = "csv"
            path = "orders.csv"
            "#,
        )
        .unwrap();

        let set = SourceSet::from_config(&config).await;
        assert!(set.is_empty());
        assert!(set.resolve("orders").is_none());
    }
}
