//! Page discovery
//!
//! Maps every `*.md` file under a pages directory to a [`DocumentPath`]
//! (`pages/sales/index.md` becomes `/sales/index.md`) and keeps the
//! registry in sync with what is on disk.

use lence_core::DocumentPath;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::registry::{LoadOutcome, QueryRegistry, RegistryError};

/// Find all pages under `pages_dir`, sorted by path
///
/// Fails only when the directory itself cannot be read. Unreadable entries
/// below it are logged and skipped.
pub fn discover_pages(pages_dir: &Path) -> Result<Vec<(DocumentPath, PathBuf)>, RegistryError> {
    let mut pages = Vec::new();

    for entry in WalkDir::new(pages_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(RegistryError::Walk {
                    root: pages_dir.to_path_buf(),
                    source,
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let Ok(relative) = path.strip_prefix(pages_dir) else {
            continue;
        };
        match DocumentPath::from_relative(relative) {
            Some(document) => pages.push((document, path.to_path_buf())),
            None => tracing::warn!(path = %path.display(), "skipping page with unsupported file name"),
        }
    }

    Ok(pages)
}

/// Summary of a [`QueryRegistry::refresh`]
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Documents that were new or changed
    pub loaded: Vec<DocumentPath>,

    pub unchanged: usize,

    /// Documents whose file disappeared
    pub unloaded: Vec<DocumentPath>,

    /// Documents that could not be read or failed to load. Their previous
    /// entry, if any, is still served.
    pub failed: Vec<(DocumentPath, RegistryError)>,
}

impl RefreshReport {
    /// Whether anything in the registry changed
    pub fn has_changes(&self) -> bool {
        !self.loaded.is_empty() || !self.unloaded.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl QueryRegistry {
    /// Synchronize the registry with the pages directory
    ///
    /// New and changed documents are loaded, documents whose file is gone
    /// are unloaded. Used both for the startup scan and for development-mode
    /// re-scans.
    pub fn refresh(&self, pages_dir: &Path) -> Result<RefreshReport, RegistryError> {
        let pages = discover_pages(pages_dir)?;
        let mut report = RefreshReport::default();
        let mut present = HashSet::new();

        for (document, path) in pages {
            present.insert(document.as_str().to_string());

            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(source) => {
                    tracing::warn!(document = %document, error = %source, "failed to read page");
                    report.failed.push((document, RegistryError::Io { path, source }));
                    continue;
                }
            };

            match self.load(&document, &content) {
                Ok(LoadOutcome::Loaded { .. }) => report.loaded.push(document),
                Ok(LoadOutcome::Unchanged) => report.unchanged += 1,
                Err(err) => {
                    tracing::warn!(document = %document, error = %err, "failed to load page");
                    report.failed.push((document, err));
                }
            }
        }

        for document in self.documents() {
            if !present.contains(document.as_str()) && self.unload(document.as_str()) {
                report.unloaded.push(document);
            }
        }

        if report.has_changes() || !report.is_clean() {
            tracing::info!(
                loaded = report.loaded.len(),
                unchanged = report.unchanged,
                unloaded = report.unloaded.len(),
                failed = report.failed.len(),
                "refreshed pages"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn discovers_nested_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sales")).unwrap();
        fs::write(dir.path().join("index.md"), "# Home").unwrap();
        fs::write(dir.path().join("sales/index.md"), "# Sales").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let paths: Vec<_> = discover_pages(dir.path())
            .unwrap()
            .into_iter()
            .map(|(doc, _)| doc.to_string())
            .collect();

        assert_eq!(paths, vec!["/index.md".to_string(), "/sales/index.md".to_string()]);
    }

    #[test]
    fn missing_pages_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_pages(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, RegistryError::Walk { .. }));
    }
}
