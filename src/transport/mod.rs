//! Transport seam: the network layer the executor drives.
//!
//! The executor never talks to the network directly. It hands a resolved
//! [`RequestDescriptor`] and the attempt's cancellation token to a
//! [`Transport`], and classifies whatever comes back. [`HttpTransport`] is the
//! default `reqwest` implementation; tests and embedders can plug in their own.

mod http;

pub use http::HttpTransport;

use crate::client::options::RequestDescriptor;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A successful (2xx) reply.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: serde_json::Value,
    pub headers: BTreeMap<String, String>,
}

impl TransportResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection refused/reset, DNS failure, broken body stream.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The attempt's cancellation token fired before a reply arrived.
    #[error("Request cancelled")]
    Cancelled,

    /// The reply arrived but its payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// Pluggable network layer.
///
/// Implementations must observe `cancel` and return [`TransportError::Cancelled`]
/// promptly once it fires. The executor discards late results regardless, so a
/// transport that cannot abort is still correct, only wasteful.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError>;

    /// Reject a request this transport can never send, before any attempt.
    fn validate(&self, _request: &RequestDescriptor) -> crate::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}
