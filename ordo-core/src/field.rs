//! Field paths into JSON response bodies.
//!
//! `name`, `category.name`, `tags[0].name` and `tags.0.name` are all valid.
//! A key applied to an array is projected over its elements, so `status` on
//! `[{"status": "a"}, {"status": "b"}]` resolves to `["a", "b"]`. An empty
//! path (or `$`) addresses the whole document.

use serde_json::Value;
use std::{borrow::Cow, fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("unclosed '[' at byte {0}")]
    UnclosedBracket(usize),
    #[error("\"{0}\" is not an array index")]
    BadIndex(String),
    #[error("empty segment at byte {0}")]
    EmptySegment(usize),
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('$').unwrap_or(s);
        let s = s.strip_prefix('.').unwrap_or(s);
        let mut segments = Vec::new();
        if s.is_empty() {
            return Ok(FieldPath { segments });
        }

        let mut pos = 0;
        for part in s.split('.') {
            let start = pos;
            pos += part.len() + 1;

            let (key, mut rest) = match part.find('[') {
                Some(idx) => (&part[..idx], &part[idx..]),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                return Err(PathError::EmptySegment(start));
            }
            if !key.is_empty() {
                segments.push(match key.parse::<usize>() {
                    Ok(index) => Segment::Index(index),
                    Err(_) => Segment::Key(key.to_string()),
                });
            }
            while !rest.is_empty() {
                let Some(close) = rest.find(']') else {
                    return Err(PathError::UnclosedBracket(start));
                };
                let index = &rest[1..close];
                segments.push(Segment::Index(
                    index
                        .parse()
                        .map_err(|_| PathError::BadIndex(index.to_string()))?,
                ));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(PathError::BadIndex(rest.to_string()));
                }
            }
        }

        Ok(FieldPath { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FieldPath {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve the path against `doc`. `None` means the field does not exist.
    pub fn resolve<'a>(&self, doc: &'a Value) -> Option<Cow<'a, Value>> {
        resolve(&self.segments, Cow::Borrowed(doc))
    }
}

fn resolve<'a>(segments: &[Segment], current: Cow<'a, Value>) -> Option<Cow<'a, Value>> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(current);
    };

    match (segment, current) {
        (Segment::Key(key), Cow::Borrowed(Value::Object(map))) => {
            resolve(rest, Cow::Borrowed(map.get(key)?))
        }
        (Segment::Key(key), Cow::Owned(Value::Object(mut map))) => {
            resolve(rest, Cow::Owned(map.remove(key)?))
        }
        (Segment::Key(key), current) => {
            let Value::Array(items) = current.as_ref() else {
                return None;
            };
            // projection: every element that has the key contributes its value
            let projected: Vec<Value> = items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
                    _ => Value::Null,
                })
                .collect();
            if !items.is_empty() && projected.iter().all(Value::is_null) {
                return None;
            }
            resolve(rest, Cow::Owned(Value::Array(projected)))
        }
        (Segment::Index(index), Cow::Borrowed(Value::Array(items))) => {
            resolve(rest, Cow::Borrowed(items.get(*index)?))
        }
        (Segment::Index(index), Cow::Owned(Value::Array(mut items))) => {
            if *index >= items.len() {
                return None;
            }
            resolve(rest, Cow::Owned(items.swap_remove(*index)))
        }
        (Segment::Index(index), Cow::Borrowed(Value::Object(map))) => {
            resolve(rest, Cow::Borrowed(map.get(&index.to_string())?))
        }
        (Segment::Index(index), Cow::Owned(Value::Object(mut map))) => {
            resolve(rest, Cow::Owned(map.remove(&index.to_string())?))
        }
        _ => None,
    }
}
