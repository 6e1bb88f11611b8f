//! Query templates and document identity

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::placeholder::extract_placeholders;

/// Identifies a markup document, e.g. `/sales/index.md`
///
/// Always starts with `/`, uses forward slashes and keeps the `.md` suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Parse a document path as it appears on the wire
    pub fn parse(raw: &str) -> Option<Self> {
        let Some(rest) = raw.strip_prefix('/') else {
            return None;
        };
        if !rest.ends_with(".md") || rest.contains('\\') {
            return None;
        }
        if rest
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == ".." || segment == ".md")
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Build a document path from a file path relative to the pages directory
    pub fn from_relative(relative: &Path) -> Option<Self> {
        let mut joined = String::new();
        for component in relative.components() {
            let part = component.as_os_str().to_str()?;
            joined.push('/');
            joined.push_str(part);
        }
        Self::parse(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid document path: {}", value))
    }
}

impl From<DocumentPath> for String {
    fn from(path: DocumentPath) -> Self {
        path.0
    }
}

/// A named, trusted SQL template extracted from a document
///
/// The declared parameter set is always derived from the SQL text and can
/// not be supplied from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    name: String,
    source: Option<String>,
    sql: String,
    params: BTreeSet<String>,
    line: usize,
}

impl QueryTemplate {
    /// Create a template, deriving its declared params from `sql`
    pub fn new(name: impl Into<String>, source: Option<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let params = extract_placeholders(&sql);
        Self {
            name: name.into(),
            source,
            sql,
            params,
            line: 0,
        }
    }

    /// Record the 1-indexed line where the block starts
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound data source, or `None` when the binding is implicit
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Input names referenced by the template
    pub fn declared_params(&self) -> &BTreeSet<String> {
        &self.params
    }

    /// Whether the template references the given input
    pub fn depends_on(&self, input: &str) -> bool {
        self.params.contains(input)
    }

    pub fn line(&self) -> usize {
        self.line
    }
}
