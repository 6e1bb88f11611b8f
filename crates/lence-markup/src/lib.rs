//! Markup parsing and query template extraction
//!
//! This crate handles:
//! - Building a small block tree from markup documents (tagged blocks,
//!   fenced code blocks and text)
//! - Extracting named query blocks into [`lence_core::QueryTemplate`]s
//! - Skipping query blocks inside no-process wrappers used for documentation

pub mod ast;
pub mod extractor;

pub use ast::{Document, FenceNode, Node, TagNode, TextNode};
pub use extractor::{TemplateExtractor, NO_PROCESS_TAGS, QUERY_FENCE_LANGUAGES, QUERY_TAG};
