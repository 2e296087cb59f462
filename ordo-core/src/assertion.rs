//! Declarative response assertions.
//!
//! Every assertion of a scenario is evaluated, and every violation is
//! reported, so one failed run shows all that is wrong with a response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{
    field::FieldPath,
    http::ResponseRecord,
    template::{self, Pass},
};

/// Element predicate of [`Assertion::ListFieldAllSatisfy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    Equals(Value),
    Contains(String),
    OneOf(Vec<Value>),
}

impl Predicate {
    pub fn test(&self, value: &Value) -> bool {
        match self {
            Predicate::Equals(expected) => json_eq(expected, value),
            Predicate::Contains(needle) => value.as_str().is_some_and(|s| s.contains(needle.as_str())),
            Predicate::OneOf(options) => options.iter().any(|o| json_eq(o, value)),
        }
    }

    fn bind<'a, F>(&self, pass: Pass, lookup: &F) -> Predicate
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        match self {
            Predicate::Equals(v) => Predicate::Equals(template::bind_value(v, pass, lookup)),
            Predicate::Contains(s) => Predicate::Contains(template::render(s, pass, lookup).text),
            Predicate::OneOf(vs) => Predicate::OneOf(
                vs.iter()
                    .map(|v| template::bind_value(v, pass, lookup))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(v) => write!(f, "== {v}"),
            Predicate::Contains(s) => write!(f, "contains {s:?}"),
            Predicate::OneOf(vs) => write!(f, "in {}", Value::Array(vs.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    StatusEquals { code: u16 },
    FieldEquals { path: String, expected: Value },
    FieldContains { path: String, substring: String },
    ListFieldAllSatisfy { path: String, predicate: Predicate },
    ListFieldNonEmpty { path: String },
}

impl Assertion {
    pub fn status(code: u16) -> Assertion {
        Assertion::StatusEquals { code }
    }

    pub fn field_eq(path: impl Into<String>, expected: impl Into<Value>) -> Assertion {
        Assertion::FieldEquals {
            path: path.into(),
            expected: expected.into(),
        }
    }

    pub fn field_contains(path: impl Into<String>, substring: impl Into<String>) -> Assertion {
        Assertion::FieldContains {
            path: path.into(),
            substring: substring.into(),
        }
    }

    pub fn all(path: impl Into<String>, predicate: Predicate) -> Assertion {
        Assertion::ListFieldAllSatisfy {
            path: path.into(),
            predicate,
        }
    }

    pub fn non_empty(path: impl Into<String>) -> Assertion {
        Assertion::ListFieldNonEmpty { path: path.into() }
    }

    /// Substitute known placeholders in expected values. The result may
    /// still hold placeholders and is bound again at run time.
    pub fn bind<'a, F>(&self, lookup: &F) -> Assertion
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        self.bind_with(Pass::Bind, lookup)
    }

    /// Final substitution right before evaluation.
    pub fn resolve<'a, F>(&self, lookup: &F) -> Assertion
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        self.bind_with(Pass::Finish, lookup)
    }

    fn bind_with<'a, F>(&self, pass: Pass, lookup: &F) -> Assertion
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        match self {
            Assertion::StatusEquals { code } => Assertion::StatusEquals { code: *code },
            Assertion::FieldEquals { path, expected } => Assertion::FieldEquals {
                path: path.clone(),
                expected: template::bind_value(expected, pass, lookup),
            },
            Assertion::FieldContains { path, substring } => Assertion::FieldContains {
                path: path.clone(),
                substring: template::render(substring, pass, lookup).text,
            },
            Assertion::ListFieldAllSatisfy { path, predicate } => Assertion::ListFieldAllSatisfy {
                path: path.clone(),
                predicate: predicate.bind(pass, lookup),
            },
            Assertion::ListFieldNonEmpty { path } => {
                Assertion::ListFieldNonEmpty { path: path.clone() }
            }
        }
    }

    /// Placeholder names left in expected values.
    pub fn placeholder_names(&self) -> Vec<String> {
        match self {
            Assertion::StatusEquals { .. } | Assertion::ListFieldNonEmpty { .. } => Vec::new(),
            Assertion::FieldEquals { expected, .. } => template::value_names(expected),
            Assertion::FieldContains { substring, .. } => template::names(substring),
            Assertion::ListFieldAllSatisfy { predicate, .. } => match predicate {
                Predicate::Equals(v) => template::value_names(v),
                Predicate::Contains(s) => template::names(s),
                Predicate::OneOf(vs) => template::value_names(&Value::Array(vs.clone())),
            },
        }
    }

    fn path(&self) -> Option<&str> {
        match self {
            Assertion::StatusEquals { .. } => None,
            Assertion::FieldEquals { path, .. }
            | Assertion::FieldContains { path, .. }
            | Assertion::ListFieldAllSatisfy { path, .. }
            | Assertion::ListFieldNonEmpty { path } => Some(path),
        }
    }

    fn check(&self, response: &ResponseRecord) -> Result<(), Violation> {
        if let Assertion::StatusEquals { code } = self {
            return if response.status == *code {
                Ok(())
            } else {
                Err(Violation::StatusMismatch {
                    expected: *code,
                    actual: response.status,
                })
            };
        }

        let Some(raw_path) = self.path() else {
            return Ok(());
        };
        let path: FieldPath = raw_path.parse().map_err(|e| Violation::InvalidPath {
            path: raw_path.to_string(),
            reason: format!("{e}"),
        })?;
        let Some(doc) = &response.body else {
            return Err(Violation::BodyNotStructured);
        };
        let actual = path.resolve(doc).ok_or_else(|| Violation::FieldNotFound {
            path: raw_path.to_string(),
        })?;
        let path = raw_path.to_string();

        match self {
            Assertion::FieldEquals { expected, .. } => {
                if json_eq(expected, &actual) {
                    Ok(())
                } else {
                    Err(Violation::Mismatch {
                        path,
                        expected: expected.clone(),
                        actual: actual.into_owned(),
                    })
                }
            }
            Assertion::FieldContains { substring, .. } => {
                let Some(text) = actual.as_str() else {
                    return Err(Violation::NotAString {
                        path,
                        actual: actual.into_owned(),
                    });
                };
                if text.contains(substring.as_str()) {
                    Ok(())
                } else {
                    Err(Violation::NotContained {
                        path,
                        expected: substring.clone(),
                        actual: text.to_string(),
                    })
                }
            }
            Assertion::ListFieldAllSatisfy { predicate, .. } => {
                let Some(items) = actual.as_array() else {
                    return Err(Violation::NotAList {
                        path,
                        actual: actual.into_owned(),
                    });
                };
                match items.iter().position(|item| !predicate.test(item)) {
                    None => Ok(()),
                    Some(index) => Err(Violation::PredicateFailed {
                        path,
                        index,
                        predicate: predicate.clone(),
                        actual: items[index].clone(),
                    }),
                }
            }
            Assertion::ListFieldNonEmpty { .. } => match actual.as_array().map(Vec::is_empty) {
                Some(true) => Err(Violation::EmptyList { path }),
                Some(false) => Ok(()),
                None => Err(Violation::NotAList {
                    path,
                    actual: actual.into_owned(),
                }),
            },
            Assertion::StatusEquals { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::StatusEquals { code } => write!(f, "status == {code}"),
            Assertion::FieldEquals { path, expected } => write!(f, "{path} == {expected}"),
            Assertion::FieldContains { path, substring } => {
                write!(f, "{path} contains {substring:?}")
            }
            Assertion::ListFieldAllSatisfy { path, predicate } => {
                write!(f, "every {path} {predicate}")
            }
            Assertion::ListFieldNonEmpty { path } => write!(f, "{path} is not empty"),
        }
    }
}

/// Numbers compare by value so `200` matches `200.0`; everything else structurally.
fn json_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| json_eq(v, other)))
        }
        (a, b) => a == b,
    }
}

/// Why a single assertion did not hold.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("expected status {expected}, got {actual}")]
    StatusMismatch { expected: u16, actual: u16 },
    #[error("field \"{path}\": expected {expected}, actual {actual}")]
    Mismatch {
        path: String,
        expected: Value,
        actual: Value,
    },
    #[error("field \"{path}\": {actual:?} does not contain {expected:?}")]
    NotContained {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("field \"{path}\" not found")]
    FieldNotFound { path: String },
    #[error("invalid field path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("field \"{path}\" is not a string: {actual}")]
    NotAString { path: String, actual: Value },
    #[error("field \"{path}\" is not a list: {actual}")]
    NotAList { path: String, actual: Value },
    #[error("field \"{path}\" is an empty list")]
    EmptyList { path: String },
    #[error("field \"{path}\"[{index}] = {actual} does not satisfy {predicate}")]
    PredicateFailed {
        path: String,
        index: usize,
        predicate: Predicate,
        actual: Value,
    },
    #[error("response body is not a JSON document")]
    BodyNotStructured,
}

/// An assertion together with the reason it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionFailure {
    pub assertion: Assertion,
    pub violation: Violation,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.assertion, self.violation)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchResult {
    pub failures: Vec<AssertionFailure>,
}

impl MatchResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluate every assertion against `response`, collecting all failures in order.
pub fn evaluate(assertions: &[Assertion], response: &ResponseRecord) -> MatchResult {
    let failures = assertions
        .iter()
        .filter_map(|assertion| {
            assertion
                .check(response)
                .err()
                .map(|violation| AssertionFailure {
                    assertion: assertion.clone(),
                    violation,
                })
        })
        .collect();
    MatchResult { failures }
}
