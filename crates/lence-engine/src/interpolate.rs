//! Parameter validation and literal interpolation
//!
//! The caller's parameter names must equal the template's declared set
//! exactly. The template SQL is then scanned once, left to right, and each
//! placeholder is rendered for the lexical context it sits in:
//!
//! | value   | code `${..}`     | whole literal `'${..}'` | part of a literal `'%${..}%'` |
//! |---------|------------------|-------------------------|-------------------------------|
//! | null    | `NULL`           | `NULL`                  | nothing                       |
//! | boolean | `TRUE` / `FALSE` | `'true'` / `'false'`    | `true` / `false`              |
//! | number  | `42`, `(-1.5)`   | `'42'`, `'-1.5'`        | `42`, `-1.5`                  |
//! | string  | `'a''s'`         | `'a''s'`                | `a''s`                        |
//!
//! Inside an `E'..'` literal backslashes are doubled as well. Inside a
//! `".."` identifier double quotes are doubled. A placeholder inside a
//! comment renders as nothing, and one inside a dollar-quoted body is
//! refused. No value can move the text that follows it into a different
//! lexical context.

use lence_core::{placeholder_spans, ParamError, ParamValue, Params, QueryTemplate};
use std::collections::BTreeSet;

/// Interpolation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpolateError {
    /// Caller-supplied names did not match the declared set
    #[error(transparent)]
    Params(#[from] ParamError),

    /// A placeholder survived substitution. Internal consistency failure,
    /// never reported to callers in this form.
    #[error("placeholder for input '{0}' left unresolved")]
    Unresolved(String),

    /// Dollar-quoted bodies have no escape syntax
    #[error("placeholder for input '{0}' sits inside a dollar-quoted body")]
    DollarQuoted(String),
}

/// Where the scanner is in the template text
#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    Code,
    /// `'..'`, or `E'..'` when `escapes` is set
    Literal { escapes: bool },
    /// `".."`
    Identifier,
    LineComment,
    /// Nesting depth of `/* .. */`
    BlockComment(usize),
    /// `$tag$ .. $tag$`, holding the delimiter
    Dollar(Vec<u8>),
}

/// Check that `params` names exactly the template's declared inputs
///
/// Missing names are reported before unexpected ones.
pub fn check_params(template: &QueryTemplate, params: &Params) -> Result<(), ParamError> {
    let expected = template.declared_params();

    let missing: BTreeSet<String> = expected
        .iter()
        .filter(|name| !params.contains_key(*name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ParamError::missing(missing));
    }

    let unexpected: BTreeSet<String> = params
        .keys()
        .filter(|name| !expected.contains(*name))
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        return Err(ParamError::unexpected(unexpected));
    }

    Ok(())
}

/// Validate `params` and return the fully substituted SQL
pub fn validate(template: &QueryTemplate, params: &Params) -> Result<String, InterpolateError> {
    check_params(template, params)?;

    let sql = template.sql();
    let bytes = sql.as_bytes();
    let spans: Vec<_> = placeholder_spans(sql).collect();

    let mut out = String::with_capacity(sql.len());
    let mut context = Context::Code;
    let mut next = 0;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let limit = spans.get(next).map_or(bytes.len(), |(range, _)| range.start);

        if i == limit {
            let (range, name) = &spans[next];
            out.push_str(&sql[copied..i]);
            let value = lookup(params, name)?;

            match &context {
                Context::Code => push_code(&mut out, &sql_literal(value), bytes.get(range.end).copied()),
                Context::Literal { escapes } => out.push_str(&literal_text(value, *escapes)),
                Context::Identifier => out.push_str(&identifier_text(value)),
                Context::LineComment | Context::BlockComment(_) => {}
                Context::Dollar(_) => return Err(InterpolateError::DollarQuoted(name.to_string())),
            }

            i = range.end;
            copied = i;
            next += 1;
            continue;
        }

        // `'${..}'` is replaced together with its quotes
        if context == Context::Code && bytes[i] == b'\'' && !escape_prefixed(bytes, i) {
            if let Some((range, name)) = spans.get(next) {
                let whole = range.start == i + 1
                    && bytes.get(range.end) == Some(&b'\'')
                    && bytes.get(range.end + 1) != Some(&b'\'');
                if whole {
                    out.push_str(&sql[copied..i]);
                    let value = lookup(params, name)?;
                    // A quoted literal keeps the template's own neighbours
                    if matches!(value, ParamValue::Null) {
                        push_code(&mut out, "NULL", bytes.get(range.end + 1).copied());
                    } else {
                        out.push_str(&quoted_literal(value));
                    }

                    i = range.end + 1;
                    copied = i;
                    next += 1;
                    continue;
                }
            }
        }

        i += step(&mut context, bytes, i, limit);
    }

    out.push_str(&sql[copied..]);
    Ok(out)
}

/// Literal for a placeholder in code position
pub fn sql_literal(value: &ParamValue) -> String {
    match value {
        ParamValue::Null => "NULL".to_string(),
        ParamValue::Bool(true) => "TRUE".to_string(),
        ParamValue::Bool(false) => "FALSE".to_string(),
        ParamValue::Number(n) => {
            let text = n.to_string();
            if text.starts_with('-') {
                format!("({})", text)
            } else {
                text
            }
        }
        ParamValue::String(s) => quote(s),
    }
}

/// Literal for a placeholder that is the entire content of a quoted literal
pub fn quoted_literal(value: &ParamValue) -> String {
    match value {
        ParamValue::Null => "NULL".to_string(),
        ParamValue::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn lookup<'a>(params: &'a Params, name: &str) -> Result<&'a ParamValue, InterpolateError> {
    params
        .get(name)
        .ok_or_else(|| InterpolateError::Unresolved(name.to_string()))
}

fn raw_text(value: &ParamValue) -> String {
    match value {
        ParamValue::Null => String::new(),
        ParamValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn literal_text(value: &ParamValue, escapes: bool) -> String {
    let text = raw_text(value);
    let text = if escapes { text.replace('\\', "\\\\") } else { text };
    text.replace('\'', "''")
}

fn identifier_text(value: &ParamValue) -> String {
    raw_text(value).replace('"', "\"\"")
}

/// Append a code-position literal, spaced off from neighbours it would
/// otherwise fuse with (`'a''b'`, `E'..'`).
fn push_code(out: &mut String, literal: &str, following: Option<u8>) {
    if out.as_bytes().last().is_some_and(|&b| fuses(b)) {
        out.push(' ');
    }
    out.push_str(literal);
    if following.is_some_and(fuses) {
        out.push(' ');
    }
}

fn fuses(byte: u8) -> bool {
    matches!(byte, b'\'' | b'"' | b'_' | b'$') || byte.is_ascii_alphanumeric() || !byte.is_ascii()
}

fn escape_prefixed(bytes: &[u8], i: usize) -> bool {
    i > 0 && matches!(bytes[i - 1], b'E' | b'e')
}

/// Length of a `$$` or `$tag$` opener at `i`, if there is one
fn dollar_delimiter(bytes: &[u8], i: usize, limit: usize) -> Option<usize> {
    let mut j = i + 1;
    if j < limit && bytes[j].is_ascii_digit() {
        return None;
    }
    while j < limit && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    (j < limit && bytes[j] == b'$').then_some(j + 1 - i)
}

/// Advance over one token of template text, never past `limit`
fn step(context: &mut Context, bytes: &[u8], i: usize, limit: usize) -> usize {
    let next_is = |byte: u8| i + 1 < limit && bytes[i + 1] == byte;

    match context {
        Context::Code => match bytes[i] {
            b'\'' => {
                *context = Context::Literal {
                    escapes: escape_prefixed(bytes, i),
                };
                1
            }
            b'"' => {
                *context = Context::Identifier;
                1
            }
            b'-' if next_is(b'-') => {
                *context = Context::LineComment;
                2
            }
            b'/' if next_is(b'*') => {
                *context = Context::BlockComment(1);
                2
            }
            b'$' => match dollar_delimiter(bytes, i, limit) {
                Some(len) => {
                    *context = Context::Dollar(bytes[i..i + len].to_vec());
                    len
                }
                None => 1,
            },
            _ => 1,
        },
        Context::Literal { escapes } => match bytes[i] {
            b'\\' if *escapes && i + 1 < limit => 2,
            b'\'' if next_is(b'\'') => 2,
            b'\'' => {
                *context = Context::Code;
                1
            }
            _ => 1,
        },
        Context::Identifier => match bytes[i] {
            b'"' if next_is(b'"') => 2,
            b'"' => {
                *context = Context::Code;
                1
            }
            _ => 1,
        },
        Context::LineComment => {
            if bytes[i] == b'\n' {
                *context = Context::Code;
            }
            1
        }
        Context::BlockComment(depth) => {
            if bytes[i] == b'/' && next_is(b'*') {
                *depth += 1;
                2
            } else if bytes[i] == b'*' && next_is(b'/') {
                *depth -= 1;
                if *depth == 0 {
                    *context = Context::Code;
                }
                2
            } else {
                1
            }
        }
        Context::Dollar(delimiter) => {
            let len = delimiter.len();
            if i + len <= limit && bytes[i..i + len] == delimiter[..] {
                *context = Context::Code;
                len
            } else {
                1
            }
        }
    }
}
