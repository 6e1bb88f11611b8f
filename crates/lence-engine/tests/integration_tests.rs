//! Integration tests for the registry → interpolation → source pipeline

use lence_core::{ColumnInfo, DocumentPath, ErrorKind, ParamValue, Params, SourceKind};
use lence_engine::ExecutionGateway;
use lence_registry::QueryRegistry;
use lence_sources::{MockSource, RawResult, SourceInfo, SourceSet};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn doc(path: &str) -> DocumentPath {
    DocumentPath::parse(path).unwrap()
}

fn params(pairs: &[(&str, ParamValue)]) -> Params {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn setup() -> (Arc<QueryRegistry>, MockSource, ExecutionGateway) {
    let registry = Arc::new(QueryRegistry::new());
    let source = MockSource::new("orders").with_fallback(RawResult::new(
        vec![ColumnInfo::new("n", "BIGINT")],
        vec![vec![json!(1)]],
    ));
    let sources = SourceSet::new().with_source(
        SourceInfo::new("orders", SourceKind::Csv, "Order lines"),
        Arc::new(source.clone()),
    );
    let gateway = ExecutionGateway::new(Arc::clone(&registry), Arc::new(sources));
    (registry, source, gateway)
}

// ============================================================================
// Registry lifecycle seen through the gateway
// ============================================================================

#[tokio::test]
async fn test_unloaded_document_is_not_found() {
    let (registry, _, gateway) = setup();
    registry
        .load(&doc("/sales.md"), "{% query name=\"total\" source=\"orders\" %}SELECT 1{% /query %}")
        .unwrap();

    assert!(gateway.execute("/sales.md", "total", &Params::new()).await.is_ok());

    registry.unload("/sales.md");
    let err = gateway.execute("/sales.md", "total", &Params::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_same_query_name_in_two_documents() {
    let (registry, source, gateway) = setup();
    registry
        .load(&doc("/a.md"), "{% query name=\"summary\" source=\"orders\" %}SELECT 'a'{% /query %}")
        .unwrap();
    registry
        .load(&doc("/b.md"), "{% query name=\"summary\" source=\"orders\" %}SELECT 'b'{% /query %}")
        .unwrap();

    gateway.execute("/a.md", "summary", &Params::new()).await.unwrap();
    gateway.execute("/b.md", "summary", &Params::new()).await.unwrap();

    assert_eq!(source.executed_sql().await, vec!["SELECT 'a'".to_string(), "SELECT 'b'".to_string()]);
}

// ============================================================================
// Trust boundary
// ============================================================================

#[tokio::test]
async fn test_injection_attempt_stays_inside_literal() {
    let (registry, source, gateway) = setup();
    registry
        .load(
            &doc("/search.md"),
            "```sql search source=orders\nSELECT * FROM products WHERE name = '${inputs.q.value}'\n```",
        )
        .unwrap();

    gateway
        .execute("/search.md", "search", &params(&[("q", "'; DROP TABLE products; --".into())]))
        .await
        .unwrap();

    assert_eq!(
        source.executed_sql().await,
        vec!["SELECT * FROM products WHERE name = '''; DROP TABLE products; --'".to_string()]
    );
}

#[tokio::test]
async fn test_pattern_literal_keeps_value_inside() {
    let (registry, source, gateway) = setup();
    registry
        .load(
            &doc("/search.md"),
            "```sql search source=orders\nSELECT * FROM products WHERE name LIKE '${inputs.q.value}%' \
             OR sku LIKE '%${inputs.q.value}%'\n```",
        )
        .unwrap();

    gateway
        .execute("/search.md", "search", &params(&[("q", "' OR 1=1 --".into())]))
        .await
        .unwrap();

    assert_eq!(
        source.executed_sql().await,
        vec!["SELECT * FROM products WHERE name LIKE ''' OR 1=1 --%' OR sku LIKE '%'' OR 1=1 --%'".to_string()]
    );
}

#[tokio::test]
async fn test_lookup_misses_reveal_nothing_about_structure() {
    let (registry, _, gateway) = setup();
    registry
        .load(&doc("/real.md"), "{% query name=\"q\" source=\"orders\" %}SELECT 1{% /query %}")
        .unwrap();

    let a = gateway.execute("/missing.md", "x", &Params::new()).await.unwrap_err();
    let b = gateway.execute("/real.md", "missing", &Params::new()).await.unwrap_err();
    let c = gateway.execute("not-a-path", "q", &Params::new()).await.unwrap_err();

    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[tokio::test]
async fn test_missing_param_is_bad_request() {
    let (registry, source, gateway) = setup();
    registry
        .load(
            &doc("/sales.md"),
            "{% query name=\"by_year\" source=\"orders\" %}SELECT * FROM o WHERE y = ${inputs.year.value}{% /query %}",
        )
        .unwrap();

    let err = gateway.execute("/sales.md", "by_year", &Params::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadRequest);
    assert_eq!(err.message, "Missing parameters");
    assert_eq!(source.execution_count().await, 0);

    let ok = gateway
        .execute("/sales.md", "by_year", &params(&[("year", 2024.into())]))
        .await
        .unwrap();
    assert_eq!(ok.row_count(), 1);
    assert_eq!(source.executed_sql().await, vec!["SELECT * FROM o WHERE y = 2024".to_string()]);
}
