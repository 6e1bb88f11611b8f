//! Integration tests for the query registry against a pages directory

use lence_core::DocumentPath;
use lence_registry::{LookupMiss, QueryRegistry, RegistryError};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn write_page(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

const DASHBOARD: &str = r#"# Dashboard

{% dropdown name="region" data="regions" value="region" /%}

{% query name="regions" source="orders" %}
SELECT DISTINCT region FROM orders ORDER BY region
{% /query %}

```sql by_region source=orders
SELECT category, sum(amount) AS total
FROM orders
WHERE region = '${inputs.region.value}'
GROUP BY category
```

{% example %}
{% query name="docs_only" %}
DROP TABLE orders
{% /query %}
{% /example %}
"#;

// ============================================================================
// Startup scan
// ============================================================================

#[test]
fn test_refresh_loads_all_pages() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "index.md", DASHBOARD);
    write_page(dir.path(), "reports/monthly.md", "{% query name=\"summary\" %}SELECT 1{% /query %}");

    let registry = QueryRegistry::new();
    let report = registry.refresh(dir.path()).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.loaded.len(), 2);
    assert_eq!(
        registry.documents(),
        vec![
            DocumentPath::parse("/index.md").unwrap(),
            DocumentPath::parse("/reports/monthly.md").unwrap(),
        ]
    );

    let by_region = registry.lookup("/index.md", "by_region").unwrap();
    assert!(by_region.depends_on("region"));
    assert_eq!(registry.lookup("/index.md", "docs_only").unwrap_err(), LookupMiss::Query);
}

#[test]
fn test_refresh_on_missing_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let registry = QueryRegistry::new();
    assert!(matches!(
        registry.refresh(&dir.path().join("pages")),
        Err(RegistryError::Walk { .. })
    ));
}

// ============================================================================
// Development-mode refresh
// ============================================================================

#[test]
fn test_refresh_picks_up_changes_and_deletions() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "a.md", "{% query name=\"q\" %}SELECT 'a1'{% /query %}");
    write_page(dir.path(), "b.md", "{% query name=\"q\" %}SELECT 'b'{% /query %}");

    let registry = QueryRegistry::new();
    registry.refresh(dir.path()).unwrap();

    write_page(dir.path(), "a.md", "{% query name=\"q\" %}SELECT 'a2'{% /query %}");
    fs::remove_file(dir.path().join("b.md")).unwrap();

    let report = registry.refresh(dir.path()).unwrap();
    assert_eq!(report.loaded, vec![DocumentPath::parse("/a.md").unwrap()]);
    assert_eq!(report.unloaded, vec![DocumentPath::parse("/b.md").unwrap()]);

    assert_eq!(registry.lookup("/a.md", "q").unwrap().sql(), "SELECT 'a2'");
    assert_eq!(registry.lookup("/b.md", "q").unwrap_err(), LookupMiss::Document);
}

#[test]
fn test_refresh_without_changes_is_quiet() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "index.md", DASHBOARD);

    let registry = QueryRegistry::new();
    registry.refresh(dir.path()).unwrap();
    let report = registry.refresh(dir.path()).unwrap();

    assert!(!report.has_changes());
    assert_eq!(report.unchanged, 1);
}

#[test]
fn test_broken_edit_keeps_last_good_templates() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "index.md", DASHBOARD);

    let registry = QueryRegistry::new();
    registry.refresh(dir.path()).unwrap();

    let broken = format!("{DASHBOARD}\n{{% query name=\"regions\" %}}SELECT 1{{% /query %}}\n");
    write_page(dir.path(), "index.md", &broken);

    let report = registry.refresh(dir.path()).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, RegistryError::DuplicateQuery { .. }));
    assert!(registry.lookup("/index.md", "by_region").is_ok());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_readers_never_see_partial_document() {
    let registry = Arc::new(QueryRegistry::new());
    let doc = DocumentPath::parse("/live.md").unwrap();
    let v1 = "{% query name=\"a\" %}SELECT 'v1'{% /query %}{% query name=\"b\" %}SELECT 'v1'{% /query %}";
    let v2 = "{% query name=\"a\" %}SELECT 'v2'{% /query %}{% query name=\"b\" %}SELECT 'v2'{% /query %}";
    registry.load(&doc, v1).unwrap();

    let writer = {
        let registry = Arc::clone(&registry);
        let doc = doc.clone();
        thread::spawn(move || {
            for i in 0..200 {
                let content = if i % 2 == 0 { v2 } else { v1 };
                registry.load(&doc, content).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..500 {
                    let entry = registry.document("/live.md").unwrap();
                    let a = entry.get("a").unwrap().sql().to_string();
                    let b = entry.get("b").unwrap().sql().to_string();
                    assert_eq!(a, b);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
