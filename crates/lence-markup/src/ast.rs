//! Block tree for markup documents
//!
//! Fenced code blocks are located with pulldown-cmark so their boundaries
//! follow CommonMark exactly. Tagged blocks (`{% name attr="v" %}` ...
//! `{% /name %}`) are scanned in the raw text between fences, which keeps
//! tag bodies byte-for-byte identical to the source. Tag-like text inside a
//! fence is never treated as a tag.

use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{%\s*(/)?\s*([A-Za-z][A-Za-z0-9_-]*)((?:[^%"]|"[^"]*"|%[^}])*?)\s*(/)?\s*%\}"#).unwrap()
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^\s"/]+))"#).unwrap()
});

/// A tagged block such as `{% query name="sales" %}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,

    /// 1-indexed line of the opening tag
    pub line: usize,
}

impl TagNode {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Text of every descendant text and fence node, in document order
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&text.text),
            Node::Fence(fence) => out.push_str(&fence.text),
            Node::Tag(tag) => collect_text(&tag.children, out),
        }
    }
}

/// A fenced code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceNode {
    /// First token of the info string, e.g. `sql`
    pub language: String,

    /// Full info string
    pub info: String,

    /// Verbatim code content
    pub text: String,

    pub line: usize,
}

impl FenceNode {
    /// Info string tokens after the language
    pub fn info_args(&self) -> impl Iterator<Item = &str> {
        self.info.split_whitespace().skip(1)
    }
}

/// Raw text between blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Tag(TagNode),
    Fence(FenceNode),
    Text(TextNode),
}

/// A parsed markup document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    /// Parse markup content. Never fails: malformed tag nesting is repaired
    /// and logged.
    pub fn parse(source: &str) -> Self {
        let lines = LineIndex::new(source);
        let mut builder = TreeBuilder::default();
        let mut cursor = 0;

        for fence in scan_fences(source) {
            if fence.range.start < cursor {
                continue;
            }
            builder.scan_tags(source, cursor..fence.range.start, &lines);
            let language = fence.info.split_whitespace().next().unwrap_or_default().to_string();
            builder.push(Node::Fence(FenceNode {
                language,
                info: fence.info,
                text: fence.text,
                line: lines.line_of(fence.range.start),
            }));
            cursor = fence.range.end;
        }
        builder.scan_tags(source, cursor..source.len(), &lines);

        Self {
            nodes: builder.finish(),
        }
    }
}

struct FenceSpan {
    range: Range<usize>,
    info: String,
    text: String,
}

fn scan_fences(source: &str) -> Vec<FenceSpan> {
    let mut fences = Vec::new();
    let mut current: Option<FenceSpan> = None;

    for (event, range) in Parser::new(source).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                current = Some(FenceSpan {
                    range,
                    info: info.trim().to_string(),
                    text: String::new(),
                });
            }
            Event::Text(text) => {
                if let Some(fence) = current.as_mut() {
                    fence.text.push_str(&text);
                }
            }
            Event::End(Tag::CodeBlock(_)) => {
                if let Some(fence) = current.take() {
                    fences.push(fence);
                }
            }
            _ => {}
        }
    }

    fences
}

fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_string();
            let value = match (caps.get(2), caps.get(3)) {
                (Some(quoted), _) => quoted.as_str().replace("\\\"", "\"").replace("\\\\", "\\"),
                (None, Some(bare)) => bare.as_str().to_string(),
                (None, None) => return None,
            };
            Some((key, value))
        })
        .collect()
}

/// Maps byte offsets to 1-indexed line numbers
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    stack: Vec<TagNode>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(open) => open.children.push(node),
            None => self.root.push(node),
        }
    }

    fn push_text(&mut self, text: &str, line: usize) {
        if !text.is_empty() {
            self.push(Node::Text(TextNode {
                text: text.to_string(),
                line,
            }));
        }
    }

    fn close(&mut self, name: &str, line: usize) {
        let Some(idx) = self.stack.iter().rposition(|open| open.name == name) else {
            tracing::warn!(tag = name, line, "ignoring closing tag with no matching open tag");
            return;
        };

        while self.stack.len() > idx + 1 {
            if let Some(unclosed) = self.stack.pop() {
                tracing::warn!(
                    tag = %unclosed.name,
                    line = unclosed.line,
                    closed_by = name,
                    "tag implicitly closed by an outer closing tag"
                );
                self.push(Node::Tag(unclosed));
            }
        }

        if let Some(done) = self.stack.pop() {
            self.push(Node::Tag(done));
        }
    }

    fn scan_tags(&mut self, source: &str, range: Range<usize>, lines: &LineIndex) {
        let segment = &source[range.clone()];
        let mut last = 0;

        for caps in TAG_RE.captures_iter(segment) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(name) = caps.get(2) else { continue };

            self.push_text(&segment[last..whole.start()], lines.line_of(range.start + last));
            let line = lines.line_of(range.start + whole.start());

            if caps.get(1).is_some() {
                self.close(name.as_str(), line);
            } else {
                let tag = TagNode {
                    name: name.as_str().to_string(),
                    attributes: parse_attributes(caps.get(3).map_or("", |m| m.as_str())),
                    children: Vec::new(),
                    line,
                };
                if caps.get(4).is_some() {
                    self.push(Node::Tag(tag));
                } else {
                    self.stack.push(tag);
                }
            }

            last = whole.end();
        }

        self.push_text(&segment[last..], lines.line_of(range.start + last));
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(unclosed) = self.stack.pop() {
            tracing::warn!(tag = %unclosed.name, line = unclosed.line, "unterminated tag closed at end of document");
            self.push(Node::Tag(unclosed));
        }
        self.root
    }
}
