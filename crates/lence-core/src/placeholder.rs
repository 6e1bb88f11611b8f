//! Placeholder scanning
//!
//! Templates reference inputs with the fixed token `${inputs.<name>.value}`.
//! Registry builds and dependency-map builds both go through
//! [`extract_placeholders`], so the two can never disagree about which inputs
//! a template depends on.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;

/// Regex source for a single placeholder token. Group 1 is the input name.
const PLACEHOLDER_PATTERN: &str = r"\$\{inputs\.([A-Za-z0-9_]+)\.value\}";

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(PLACEHOLDER_PATTERN).unwrap());

/// Collect the distinct input names referenced by a template.
///
/// Pure and deterministic: the same text always yields the same set, no
/// matter how many times a placeholder repeats.
pub fn extract_placeholders(sql: &str) -> BTreeSet<String> {
    PLACEHOLDER_RE
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Byte range and input name of every placeholder token, left to right
pub fn placeholder_spans(sql: &str) -> impl Iterator<Item = (Range<usize>, &str)> + '_ {
    PLACEHOLDER_RE.captures_iter(sql).filter_map(|caps| {
        let token = caps.get(0)?;
        let name = caps.get(1)?;
        Some((token.range(), name.as_str()))
    })
}
