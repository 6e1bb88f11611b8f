//! Query template extraction
//!
//! Walks a parsed [`Document`] and turns every named query block into a
//! [`QueryTemplate`]. Two syntaxes are recognized:
//!
//! ````text
//! {% query name="sales" source="orders" %}
//! SELECT * FROM orders WHERE region = '${inputs.region.value}'
//! {% /query %}
//!
//! ```sql sales source=orders
//! SELECT * FROM orders WHERE region = '${inputs.region.value}'
//! ```
//! ````
//!
//! Blocks nested anywhere inside a no-process wrapper (`{% example %}` or
//! `{% raw %}`) are documentation and are skipped.

use lence_core::QueryTemplate;

use crate::ast::{Document, FenceNode, Node, TagNode};

/// Tag name of a tagged query block
pub const QUERY_TAG: &str = "query";

/// Fence languages that mark a named query block
pub const QUERY_FENCE_LANGUAGES: &[&str] = &["sql", "query"];

/// Wrappers whose contents are never registered
pub const NO_PROCESS_TAGS: &[&str] = &["example", "raw"];

/// Extracts query templates from markup content
#[derive(Debug, Clone)]
pub struct TemplateExtractor {
    no_process: Vec<String>,
}

impl TemplateExtractor {
    pub fn new() -> Self {
        Self {
            no_process: NO_PROCESS_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Also treat `tag` as a no-process wrapper
    pub fn with_no_process_tag(mut self, tag: impl Into<String>) -> Self {
        self.no_process.push(tag.into());
        self
    }

    /// Extract every query candidate from raw document content
    ///
    /// Candidates are returned in document order. Duplicate names are kept;
    /// the registry decides what to do with them.
    pub fn extract(&self, content: &str) -> Vec<QueryTemplate> {
        let document = Document::parse(content);
        self.extract_from(&document)
    }

    /// Extract from an already parsed document
    pub fn extract_from(&self, document: &Document) -> Vec<QueryTemplate> {
        let mut templates = Vec::new();
        self.walk(&document.nodes, &mut templates);
        templates
    }

    /// Whether a tag suppresses processing of its contents
    pub fn is_no_process(&self, tag: &TagNode) -> bool {
        self.no_process.iter().any(|name| name == &tag.name)
    }

    fn walk(&self, nodes: &[Node], out: &mut Vec<QueryTemplate>) {
        for node in nodes {
            match node {
                Node::Tag(tag) if self.is_no_process(tag) => {
                    tracing::debug!(tag = %tag.name, line = tag.line, "skipping no-process block");
                }
                Node::Tag(tag) if tag.name == QUERY_TAG => {
                    if let Some(template) = Self::from_tag(tag) {
                        out.push(template);
                    }
                }
                Node::Tag(tag) => self.walk(&tag.children, out),
                Node::Fence(fence) => {
                    if let Some(template) = Self::from_fence(fence) {
                        out.push(template);
                    }
                }
                Node::Text(_) => {}
            }
        }
    }

    fn from_tag(tag: &TagNode) -> Option<QueryTemplate> {
        let Some(name) = tag.attribute("name").filter(|n| !n.is_empty()) else {
            tracing::warn!(line = tag.line, "query block without a name attribute ignored");
            return None;
        };

        let sql = tag.text_content();
        let sql = sql.trim();
        if sql.is_empty() {
            tracing::warn!(query = name, line = tag.line, "query block with empty SQL ignored");
            return None;
        }

        let source = tag.attribute("source").map(str::to_string);
        Some(QueryTemplate::new(name, source, sql).at_line(tag.line))
    }

    fn from_fence(fence: &FenceNode) -> Option<QueryTemplate> {
        if !QUERY_FENCE_LANGUAGES.contains(&fence.language.as_str()) {
            return None;
        }

        let mut name = None;
        let mut source = None;
        for arg in fence.info_args() {
            match arg.split_once('=') {
                Some(("source", value)) => source = Some(value.trim_matches('"').to_string()),
                Some(("name", value)) => name = Some(value.trim_matches('"').to_string()),
                Some(_) => {}
                None if name.is_none() => name = Some(arg.to_string()),
                None => {}
            }
        }

        // An unnamed sql fence is an ordinary code sample
        let name = name.filter(|n| !n.is_empty())?;

        let sql = fence.text.trim();
        if sql.is_empty() {
            tracing::warn!(query = %name, line = fence.line, "query fence with empty SQL ignored");
            return None;
        }

        Some(QueryTemplate::new(name, source, sql).at_line(fence.line))
    }
}

impl Default for TemplateExtractor {
    fn default() -> Self {
        Self::new()
    }
}
