//! The transport boundary.
//!
//! The sequencer only knows [`Transport`]: send an [`ExecutableRequest`], get
//! a status and body back or a [`TransportError`]. [`HttpClient`] is the
//! `reqwest` implementation; it applies the project's timeout, retries
//! failed connections (and timeouts of idempotent requests) and publishes every exchange as a [`Log`] to the
//! task-local [`CHANNEL`] when one is in scope.
use backon::Retryable;
use indexmap::IndexMap;
use std::{
    ops::Deref,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    config::{ProjectConfig, RetryConfig},
    masking,
    request::{ExecutableRequest, Method},
};

tokio::task_local! {
    pub static CHANNEL: Arc<Mutex<Option<broadcast::Sender<Log>>>>;
}

/// Subscribe to the channel to see the real-time network logs.
pub fn subscribe() -> eyre::Result<broadcast::Receiver<Log>> {
    CHANNEL
        .try_with(|ch| {
            let Ok(guard) = ch.lock() else {
                eyre::bail!("failed to acquire http channel lock");
            };
            let Some(tx) = guard.deref() else {
                eyre::bail!("http channel has been already closed");
            };
            Ok(tx.subscribe())
        })
        .map_err(|_| eyre::eyre!("http channel is not in scope"))?
}

fn publish(log: Log) {
    let _ = CHANNEL.try_with(|ch| {
        let Ok(guard) = ch.lock() else {
            warn!("failed to acquire http channel lock");
            return;
        };
        if let Some(tx) = guard.deref() {
            // no receiver is fine: nobody asked for http logs
            let _ = tx.send(log);
        }
    });
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// A failed connection never reached the server. A timed out request may
    /// have been processed, so only idempotent methods are sent again.
    pub fn is_retryable(&self, method: Method) -> bool {
        match self {
            TransportError::Connect(_) => true,
            TransportError::Timeout(_) => method.is_idempotent(),
            TransportError::Other(_) => false,
        }
    }
}

/// Status and undecoded body, as the transport saw them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

/// A response with its body parsed into a field-addressable document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    /// `None` when the body is not JSON.
    pub body: Option<serde_json::Value>,
    pub text: String,
}

impl From<RawResponse> for ResponseRecord {
    fn from(raw: RawResponse) -> Self {
        let body = serde_json::from_str(&raw.body).ok();
        ResponseRecord {
            status: raw.status,
            headers: raw.headers,
            body,
            text: raw.body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRequest {
    pub url: url::Url,
    pub method: Method,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogResponse {
    pub status: Option<u16>,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Log {
    pub request: LogRequest,
    pub response: LogResponse,
    pub elapsed: Duration,
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ExecutableRequest) -> Result<RawResponse, TransportError>;
}

/// `reqwest` backed [`Transport`].
#[derive(Clone, Debug, Default)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Option<Duration>,
    retry: RetryConfig,
    show_sensitive: bool,
}

impl HttpClient {
    pub fn new() -> HttpClient {
        HttpClient::default()
    }

    /// Client configured by the project's `timeout` and `retry` settings.
    pub fn from_project(project: &ProjectConfig) -> HttpClient {
        HttpClient {
            timeout: project.timeout,
            retry: project.retry.clone(),
            ..HttpClient::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> HttpClient {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> HttpClient {
        self.retry = retry;
        self
    }

    /// Log credentials verbatim instead of masking them.
    pub fn show_sensitive(mut self, show: bool) -> HttpClient {
        self.show_sensitive = show;
        self
    }

    async fn execute(&self, request: &ExecutableRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .inner
            .request(request.method.into(), request.url.clone());
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let res = builder.send().await.map_err(|e| self.classify(e))?;
        let status = res.status().as_u16();
        let headers = res
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = res.text().await.map_err(|e| self.classify(e))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout.unwrap_or_default())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }

    fn log(
        &self,
        request: &ExecutableRequest,
        result: &Result<RawResponse, TransportError>,
        elapsed: Duration,
    ) -> Log {
        let body = request
            .body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned());
        let (url, headers, body) = if self.show_sensitive {
            (request.url.clone(), request.headers.clone(), body)
        } else {
            (
                masking::mask_url(&request.url),
                masking::mask_headers(&request.headers),
                body.map(|b| masking::mask_body(&b)),
            )
        };

        let response = match result {
            Ok(res) => LogResponse {
                status: Some(res.status),
                headers: res.headers.clone(),
                body: res.body.clone(),
            },
            Err(e) => LogResponse {
                body: e.to_string(),
                ..LogResponse::default()
            },
        };

        Log {
            request: LogRequest {
                url,
                method: request.method,
                headers,
                body,
            },
            response,
            elapsed,
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: &ExecutableRequest) -> Result<RawResponse, TransportError> {
        debug!("Requesting {} {}", request.method, request.url);
        let started = tokio::time::Instant::now();

        let result = (|| self.execute(request))
            .retry(self.retry.backoff())
            .when(|e| e.is_retryable(request.method))
            .notify(|e, delay| warn!("{} {} failed, retrying in {delay:?}: {e}", request.method, request.url))
            .await;

        publish(self.log(request, &result, started.elapsed()));
        result
    }
}
