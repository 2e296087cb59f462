//! Immutable request construction.
//!
//! [`RequestBuilder`] is a value: every step consumes it and returns a new
//! one, so a partially built request can be cloned and branched freely. The
//! finished [`RequestDescriptor`] still contains `{name}` placeholders; they
//! are bound by [`RequestDescriptor::build`] right before dispatch. Write
//! `{{` for a literal `{` in a path, query value, header or body.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

use crate::{
    error::ConfigError,
    template::{self, Pass},
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    /// Whether sending the request twice has the effect of sending it once.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Method::Get | Method::Put | Method::Delete)
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Text,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Raw request payload with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub content_type: ContentType,
    /// Body template.
    pub raw: String,
}

impl Body {
    fn render<'a, F>(&self, pass: Pass, lookup: F) -> template::Rendered
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        match self.content_type {
            ContentType::Json => template::render_json(&self.raw, pass, lookup),
            ContentType::Text => template::render(&self.raw, pass, lookup),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub headers: IndexMap<String, String>,
    pub query: IndexMap<String, String>,
    pub body: Option<Body>,
    /// Serialization failure recorded by [`RequestBuilder::json`], reported at build time.
    #[serde(skip)]
    pub(crate) encoding_error: Option<String>,
}

/// Validated base URI of the service under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    pub fn parse(base: &str) -> Result<Endpoint, ConfigError> {
        let base = base.trim();
        if base.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        let url =
            Url::parse(base).map_err(|e| ConfigError::InvalidEndpoint(base.to_string(), e))?;
        Ok(Endpoint { url })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Join a rendered path onto the base, keeping the base's own path prefix.
    fn join(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// A request with every placeholder bound, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableRequest {
    pub method: Method,
    pub url: Url,
    pub headers: IndexMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("missing binding for {}", .0.join(", "))]
    MissingBinding(Vec<String>),
    #[error("{0}")]
    Encoding(String),
}

impl RequestDescriptor {
    /// Every placeholder name the request refers to.
    pub fn placeholder_names(&self) -> Vec<String> {
        let mut names = template::names(&self.path);
        let mut extend = |more: Vec<String>| {
            for name in more {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        };
        for value in self.headers.values().chain(self.query.values()) {
            extend(template::names(value));
        }
        if let Some(body) = &self.body {
            extend(template::names(&body.raw));
        }
        names
    }

    /// Substitute `params` into every template of the request. Placeholders
    /// not found in `params` are kept for later binding.
    pub fn bind<'a, F>(&self, lookup: &F) -> RequestDescriptor
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        let render = |s: &str| template::render(s, Pass::Bind, lookup).text;
        RequestDescriptor {
            method: self.method,
            path: render_path(&self.path, Pass::Bind, lookup).text,
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), render(v)))
                .collect(),
            query: self
                .query
                .iter()
                .map(|(k, v)| (k.clone(), render(v)))
                .collect(),
            body: self.body.as_ref().map(|body| Body {
                content_type: body.content_type,
                raw: body.render(Pass::Bind, lookup).text,
            }),
            encoding_error: self.encoding_error.clone(),
        }
    }

    /// Bind every placeholder and produce a dispatchable request. Pure.
    pub fn build<'a, F>(&self, endpoint: &Endpoint, lookup: F) -> Result<ExecutableRequest, BuildError>
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        if let Some(e) = &self.encoding_error {
            return Err(BuildError::Encoding(e.clone()));
        }

        let mut missing = Vec::new();
        let mut track = |rendered: template::Rendered| {
            for name in rendered.unresolved {
                if !missing.contains(&name) {
                    missing.push(name);
                }
            }
            rendered.text
        };

        let path = track(render_path(&self.path, Pass::Finish, &lookup));
        let query: Vec<(String, String)> = self
            .query
            .iter()
            .map(|(k, v)| (k.clone(), track(template::render(v, Pass::Finish, &lookup))))
            .collect();
        let mut headers: IndexMap<String, String> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), track(template::render(v, Pass::Finish, &lookup))))
            .collect();
        let body = self
            .body
            .as_ref()
            .map(|body| (body.content_type, track(body.render(Pass::Finish, &lookup))));

        if !missing.is_empty() {
            return Err(BuildError::MissingBinding(missing));
        }

        let mut url = endpoint
            .join(&path)
            .map_err(|e| BuildError::Encoding(format!("invalid path \"{path}\": {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        let body = match body {
            Some((ContentType::Json, raw)) => {
                serde_json::from_str::<Value>(&raw)
                    .map_err(|e| BuildError::Encoding(format!("body is not valid JSON: {e}")))?;
                Some((ContentType::Json, raw))
            }
            other => other,
        };
        if let Some((content_type, _)) = &body {
            if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                headers.insert("content-type".into(), content_type.mime().into());
            }
        }

        Ok(ExecutableRequest {
            method: self.method,
            url,
            headers,
            body: body.map(|(_, raw)| raw.into_bytes()),
        })
    }
}

/// Path placeholders are bound percent-encoded, as a single path segment.
fn render_path<'a, F>(path: &str, pass: Pass, lookup: &F) -> template::Rendered
where
    F: Fn(&str) -> Option<&'a Value>,
{
    template::render_with(path, pass, |name| {
        lookup(name).map(|v| urlencoding::encode(&template::to_text(v)).into_owned())
    })
}

/// Fluent, immutable request builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBuilder {
    inner: RequestDescriptor,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            inner: RequestDescriptor {
                method,
                path: path.into(),
                headers: IndexMap::new(),
                query: IndexMap::new(),
                body: None,
                encoding_error: None,
            },
        }
    }

    pub fn get(path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Delete, path)
    }

    pub fn patch(path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Patch, path)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> RequestBuilder {
        self.inner.headers.insert(key.into(), value.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> RequestBuilder {
        self.inner.query.insert(key.into(), value.into());
        self
    }

    /// JSON body given as text; may contain placeholders.
    pub fn body(mut self, raw: impl Into<String>) -> RequestBuilder {
        self.inner.body = Some(Body {
            content_type: ContentType::Json,
            raw: raw.into(),
        });
        self.inner.encoding_error = None;
        self
    }

    pub fn text(mut self, raw: impl Into<String>) -> RequestBuilder {
        self.inner.body = Some(Body {
            content_type: ContentType::Text,
            raw: raw.into(),
        });
        self.inner.encoding_error = None;
        self
    }

    /// Serialize `json` as the body. The serialized document is literal:
    /// braces in its strings are never placeholders. A serialization failure
    /// is kept and reported when the request is built.
    pub fn json<T: Serialize + ?Sized>(mut self, json: &T) -> RequestBuilder {
        match serde_json::to_string(json) {
            Ok(raw) => {
                self.inner.body = Some(Body {
                    content_type: ContentType::Json,
                    raw: template::escape(&raw),
                });
                self.inner.encoding_error = None;
            }
            Err(e) => {
                self.inner.body = None;
                self.inner.encoding_error = Some(format!("failed to serialize body: {e}"));
            }
        }
        self
    }

    pub fn descriptor(self) -> RequestDescriptor {
        self.inner
    }
}

impl From<RequestBuilder> for RequestDescriptor {
    fn from(builder: RequestBuilder) -> Self {
        builder.descriptor()
    }
}
