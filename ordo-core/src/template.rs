//! `{name}` placeholders in paths, query values, headers, bodies and expected values.
//!
//! A placeholder is a `{` immediately followed by an identifier
//! (`[A-Za-z_][A-Za-z0-9_.-]*`) and a closing `}`. Everything else, including
//! the braces of a JSON object, is literal text. That lets request bodies be
//! written as plain JSON documents with placeholders in them:
//!
//! ```text
//! {"id": {petId}, "name": "{name}"}
//!          ^^^^^^          ^^^^^^
//! ```
//!
//! `{{` stands for a literal `{`, so `{{name}` is the text `{name}`.
//!
//! Templates are rendered in two passes. [`Pass::Bind`] substitutes what is
//! known ahead of the run (parameters) and escapes what it inserts, so a
//! bound value is never scanned for placeholders again. [`Pass::Finish`]
//! substitutes run-time variables and resolves escapes.

use serde_json::Value;
use std::ops::Range;

/// A placeholder occurrence in a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// Byte range of `{name}` including braces.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Partial binding; the output is still a template.
    Bind,
    /// Final rendering; the output is plain text.
    Finish,
}

/// Where a placeholder sits in a JSON template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Text,
    JsonString,
    JsonValue,
}

#[derive(Debug)]
enum Token<'s> {
    Text(&'s str),
    Escape,
    Placeholder(Placeholder),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'{') {
            tokens.push(Token::Text(&input[text_start..i]));
            tokens.push(Token::Escape);
            i += 2;
            text_start = i;
            continue;
        }
        let rest = &input[i + 1..];
        if !rest.chars().next().is_some_and(is_ident_start) {
            i += 1;
            continue;
        }
        let end = rest
            .char_indices()
            .find(|(_, c)| !is_ident_continue(*c))
            .map(|(idx, _)| idx);
        match end {
            Some(idx) if rest[idx..].starts_with('}') => {
                tokens.push(Token::Text(&input[text_start..i]));
                tokens.push(Token::Placeholder(Placeholder {
                    name: rest[..idx].to_string(),
                    span: i..i + idx + 2,
                }));
                i += idx + 2;
                text_start = i;
            }
            _ => i += 1,
        }
    }
    tokens.push(Token::Text(&input[text_start..]));

    tokens
}

/// Scan `input` for placeholders, in order of appearance.
pub fn placeholders(input: &str) -> Vec<Placeholder> {
    tokenize(input)
        .into_iter()
        .filter_map(|token| match token {
            Token::Placeholder(p) => Some(p),
            _ => None,
        })
        .collect()
}

/// Placeholder names referenced by `input`, deduplicated, in order of first appearance.
pub fn names(input: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for placeholder in placeholders(input) {
        if !names.contains(&placeholder.name) {
            names.push(placeholder.name);
        }
    }
    names
}

/// Make `text` literal: the result renders back to `text` and has no placeholders.
pub fn escape(text: &str) -> String {
    text.replace('{', "{{")
}

fn escape_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape(s)),
        Value::Array(items) => Value::Array(items.iter().map(escape_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), escape_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Text form of a bound value. Strings are inserted raw, anything else as JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Contents of a JSON string literal holding `text`, without the quotes.
fn json_escape(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Tracks whether the scanner is inside a JSON string literal.
#[derive(Debug, Default)]
struct JsonScan {
    in_string: bool,
    escaped: bool,
}

impl JsonScan {
    fn feed(&mut self, text: &str) {
        for b in text.bytes() {
            if self.escaped {
                self.escaped = false;
            } else if self.in_string && b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = !self.in_string;
            }
        }
    }
}

/// Result of rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Placeholders `lookup` had no value for. They are left in `text` verbatim.
    pub unresolved: Vec<String>,
}

fn substitute<F>(input: &str, json: bool, pass: Pass, lookup: F) -> Rendered
where
    F: Fn(&str, Slot) -> Option<String>,
{
    let mut text = String::with_capacity(input.len());
    let mut unresolved = Vec::new();
    let mut scan = JsonScan::default();

    for token in tokenize(input) {
        match token {
            Token::Text(s) => {
                if json {
                    scan.feed(s);
                }
                text.push_str(s);
            }
            Token::Escape => match pass {
                Pass::Bind => text.push_str("{{"),
                Pass::Finish => text.push('{'),
            },
            Token::Placeholder(placeholder) => {
                let slot = match (json, scan.in_string) {
                    (false, _) => Slot::Text,
                    (true, true) => Slot::JsonString,
                    (true, false) => Slot::JsonValue,
                };
                match (lookup(&placeholder.name, slot), pass) {
                    (Some(value), Pass::Bind) => text.push_str(&escape(&value)),
                    (Some(value), Pass::Finish) => text.push_str(&value),
                    (None, _) => {
                        text.push_str(&input[placeholder.span.clone()]);
                        if !unresolved.contains(&placeholder.name) {
                            unresolved.push(placeholder.name);
                        }
                    }
                }
            }
        }
    }

    Rendered { text, unresolved }
}

/// Substitute every placeholder `lookup` knows about.
pub fn render<'a, F>(input: &str, pass: Pass, lookup: F) -> Rendered
where
    F: Fn(&str) -> Option<&'a Value>,
{
    render_with(input, pass, |name| lookup(name).map(to_text))
}

/// Like [`render`], with the caller deciding how a value turns into text.
pub fn render_with<F>(input: &str, pass: Pass, lookup: F) -> Rendered
where
    F: Fn(&str) -> Option<String>,
{
    substitute(input, false, pass, |name, _| lookup(name))
}

/// Render a JSON document template.
///
/// Inside a string literal a value is inserted as escaped string content.
/// Anywhere else it is inserted as a JSON value, so strings arrive quoted.
/// Either way a value can never change the shape of the document.
pub fn render_json<'a, F>(input: &str, pass: Pass, lookup: F) -> Rendered
where
    F: Fn(&str) -> Option<&'a Value>,
{
    substitute(input, true, pass, |name, slot| {
        lookup(name).map(|value| match slot {
            Slot::JsonString => json_escape(&to_text(value)),
            Slot::JsonValue | Slot::Text => value.to_string(),
        })
    })
}

/// Substitute placeholders inside every string of a JSON value.
///
/// A string consisting of exactly one placeholder is replaced by the bound
/// value itself, keeping its JSON type.
pub fn bind_value<'a, F>(value: &Value, pass: Pass, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<&'a Value>,
{
    match value {
        Value::String(s) => {
            let found = placeholders(s);
            if let [only] = found.as_slice() {
                if only.span == (0..s.len()) {
                    if let Some(bound) = lookup(&only.name) {
                        return match pass {
                            Pass::Bind => escape_value(bound),
                            Pass::Finish => bound.clone(),
                        };
                    }
                }
            }
            Value::String(render(s, pass, lookup).text)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| bind_value(v, pass, lookup))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), bind_value(v, pass, lookup)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Placeholder names inside every string of a JSON value.
pub fn value_names(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_value_names(value, &mut out);
    out
}

fn collect_value_names(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for name in names(s) {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_value_names(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_value_names(v, out)),
        _ => {}
    }
}
