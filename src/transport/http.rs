use super::{Transport, TransportError, TransportResponse};
use crate::client::options::RequestDescriptor;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::Proxy;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Fallback timeout when a descriptor reaches the transport unresolved.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in [`TransportError::Http`] messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpTransport {
    /// Build from environment defaults (`FETCH_BASE_URL`, `FETCH_HTTP_*`, `FETCH_PROXY_URL`).
    pub fn new() -> Result<Self> {
        let base_url = env::var("FETCH_BASE_URL").ok();
        Self::with_base_url(base_url.as_deref())
    }

    pub fn with_base_url(base_url: Option<&str>) -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(
                env::var("FETCH_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("FETCH_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("FETCH_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("http_transport"),
            )
        })?;

        Self::from_client(client, base_url)
    }

    /// Wrap an existing client, e.g. one shared with the rest of the application.
    pub fn from_client(client: reqwest::Client, base_url: Option<&str>) -> Result<Self> {
        let base_url = base_url
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    Error::configuration_with_context(
                        format!("invalid base URL '{}'", raw),
                        ErrorContext::new()
                            .with_field_path("base_url")
                            .with_details(e.to_string())
                            .with_source("http_transport"),
                    )
                })
            })
            .transpose()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    fn resolve_url(&self, raw: &str) -> std::result::Result<Url, TransportError> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    TransportError::Network(format!(
                        "relative URL '{}' requires a base URL",
                        raw
                    ))
                })?;
                base.join(raw)
                    .map_err(|e| TransportError::Network(format!("invalid URL '{}': {}", raw, e)))
            }
            Err(e) => Err(TransportError::Network(format!(
                "invalid URL '{}': {}",
                raw, e
            ))),
        }
    }

    async fn perform(
        &self,
        request: &RequestDescriptor,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let url = self.resolve_url(&request.url)?;
        let timeout = request.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let request_id = Uuid::new_v4().to_string();

        let mut req = self
            .client
            .request(request.method.clone(), url)
            .timeout(timeout)
            .header("x-request-id", request_id.as_str());

        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(params) = &request.params {
            req = req.query(&query_pairs(params));
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| map_reqwest_error(e, timeout))?;
        let status = resp.status();
        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|s| (k.as_str().to_ascii_lowercase(), s.to_string()))
            })
            .collect();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        debug!(
            http_status = status.as_u16(),
            request_id = request_id.as_str(),
            method = request.method.as_str(),
            url = request.url.as_str(),
            "resilient-fetch http reply"
        );

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            let message: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    message
                },
            });
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body: decode_body(&bytes),
            headers,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> std::result::Result<TransportResponse, TransportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.perform(request) => result,
        }
    }

    fn validate(&self, request: &RequestDescriptor) -> Result<()> {
        self.resolve_url(&request.url).map(|_| ()).map_err(|e| {
            Error::validation_with_context(
                format!("unusable request URL '{}'", request.url),
                ErrorContext::new()
                    .with_field_path("request.url")
                    .with_details(e.to_string())
                    .with_source("http_transport"),
            )
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if let Some(status) = err.status() {
        TransportError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Query values are sent as their plain text form; `null` becomes an empty value.
fn query_pairs(params: &BTreeMap<String, serde_json::Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// JSON when it parses, the raw text otherwise, `null` for an empty body.
fn decode_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
    })
}
