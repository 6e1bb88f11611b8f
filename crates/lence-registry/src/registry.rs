//! Per-document template storage with atomic replacement

use chrono::{DateTime, Utc};
use lence_core::{DocumentPath, QueryTemplate};
use lence_markup::TemplateExtractor;
use sha2::{Digest, Sha256};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// All templates defined by one document
///
/// Immutable once built. A reload builds a fresh value and swaps the `Arc`.
#[derive(Debug)]
pub struct DocumentQueries {
    document: DocumentPath,
    templates: BTreeMap<String, Arc<QueryTemplate>>,

    /// SHA-256 of the document text, hex encoded
    content_hash: String,

    loaded_at: DateTime<Utc>,
}

impl DocumentQueries {
    pub fn document(&self) -> &DocumentPath {
        &self.document
    }

    pub fn get(&self, name: &str) -> Option<&Arc<QueryTemplate>> {
        self.templates.get(name)
    }

    /// Templates ordered by name
    pub fn templates(&self) -> impl Iterator<Item = &Arc<QueryTemplate>> {
        self.templates.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Result of [`QueryRegistry::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The document was (re)built and now holds `queries` templates
    Loaded { queries: usize },

    /// Content hash matched the current entry; nothing was rebuilt
    Unchanged,
}

/// Why a lookup found nothing
///
/// Only for internal logging. Callers must collapse both cases into a single
/// not-found response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    Document,
    Query,
}

impl LookupMiss {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document not loaded",
            Self::Query => "query not defined in document",
        }
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{document}: query '{name}' is defined twice (lines {first_line} and {second_line})")]
    DuplicateQuery {
        document: DocumentPath,
        name: String,
        first_line: usize,
        second_line: usize,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Process-wide query registry
///
/// Readers clone a document's `Arc` under a short read lock; the only writer
/// builds the replacement outside the lock and swaps it in.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    documents: RwLock<HashMap<String, Arc<DocumentQueries>>>,
    extractor: TemplateExtractor,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom extractor, e.g. with extra no-process tags
    pub fn with_extractor(extractor: TemplateExtractor) -> Self {
        Self {
            documents: RwLock::default(),
            extractor,
        }
    }

    /// Parse `content` and replace the document's templates
    ///
    /// On error the previous entry for `document` stays untouched.
    pub fn load(&self, document: &DocumentPath, content: &str) -> Result<LoadOutcome, RegistryError> {
        let hash = content_hash(content);
        if self
            .document(document.as_str())
            .is_some_and(|current| current.content_hash == hash)
        {
            tracing::debug!(document = %document, "document unchanged");
            return Ok(LoadOutcome::Unchanged);
        }

        let entry = self.build(document, content, hash)?;
        let queries = entry.len();
        self.write()
            .insert(document.as_str().to_string(), Arc::new(entry));

        tracing::info!(document = %document, queries, "loaded document");
        Ok(LoadOutcome::Loaded { queries })
    }

    fn build(&self, document: &DocumentPath, content: &str, content_hash: String) -> Result<DocumentQueries, RegistryError> {
        let mut templates = BTreeMap::new();

        for template in self.extractor.extract(content) {
            match templates.entry(template.name().to_string()) {
                Entry::Occupied(existing) => {
                    let first: &Arc<QueryTemplate> = existing.get();
                    return Err(RegistryError::DuplicateQuery {
                        document: document.clone(),
                        name: existing.key().clone(),
                        first_line: first.line(),
                        second_line: template.line(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(template));
                }
            }
        }

        Ok(DocumentQueries {
            document: document.clone(),
            templates,
            content_hash,
            loaded_at: Utc::now(),
        })
    }

    /// Find a template by document path and query name
    pub fn lookup(&self, document: &str, name: &str) -> Result<Arc<QueryTemplate>, LookupMiss> {
        let entry = self.document(document).ok_or(LookupMiss::Document)?;
        entry.get(name).cloned().ok_or(LookupMiss::Query)
    }

    /// Drop a document's templates. Returns whether it was loaded.
    pub fn unload(&self, document: &str) -> bool {
        let removed = self.write().remove(document).is_some();
        if removed {
            tracing::info!(document, "unloaded document");
        }
        removed
    }

    /// Current entry for a document
    pub fn document(&self, document: &str) -> Option<Arc<DocumentQueries>> {
        self.read().get(document).cloned()
    }

    /// Loaded document paths, sorted
    pub fn documents(&self) -> Vec<DocumentPath> {
        let mut paths: Vec<_> = self
            .read()
            .values()
            .map(|entry| entry.document.clone())
            .collect();
        paths.sort();
        paths
    }

    /// One document's templates ordered by name
    pub fn queries(&self, document: &str) -> Option<Vec<Arc<QueryTemplate>>> {
        self.document(document)
            .map(|entry| entry.templates().cloned().collect())
    }

    /// Number of loaded documents
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking writer never leaves a half-built map behind, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<DocumentQueries>>> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<DocumentQueries>>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
