//! Error classification logic

use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy used for retry decisions and for the published error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connection-level failure, no HTTP status.
    Network,
    /// 4xx other than 429.
    HttpClient,
    /// 429.
    TooManyRequests,
    /// 5xx.
    HttpServer,
    Timeout,
    /// Superseded or torn down. Never published, never retried.
    Cancellation,
    /// A 2xx payload that does not decode into the caller's type.
    Decode,
}

impl ErrorClass {
    pub fn of(err: &TransportError) -> Self {
        match err {
            TransportError::Network(_) => ErrorClass::Network,
            TransportError::Http { status, .. } => Self::from_status(*status),
            TransportError::Timeout(_) => ErrorClass::Timeout,
            TransportError::Cancelled => ErrorClass::Cancellation,
            TransportError::Decode(_) => ErrorClass::Decode,
        }
    }

    /// Statuses outside 4xx/5xx should not arrive as errors; they are treated
    /// like server errors so an odd proxy reply is retried rather than trusted.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorClass::TooManyRequests,
            400..=499 => ErrorClass::HttpClient,
            _ => ErrorClass::HttpServer,
        }
    }

    pub fn is_retryable(self) -> bool {
        match self {
            ErrorClass::Network
            | ErrorClass::TooManyRequests
            | ErrorClass::HttpServer
            | ErrorClass::Timeout => true,
            ErrorClass::HttpClient | ErrorClass::Cancellation | ErrorClass::Decode => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::HttpClient => "http_client",
            ErrorClass::TooManyRequests => "too_many_requests",
            ErrorClass::HttpServer => "http_server",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Cancellation => "cancellation",
            ErrorClass::Decode => "decode",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure as observed by UI code through `ClientState::error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub status: Option<u16>,
    pub message: String,
    /// Attempts made before giving up, including the first.
    pub attempts: u32,
}

impl ClassifiedError {
    pub fn from_transport(err: &TransportError, attempts: u32) -> Self {
        Self {
            class: ErrorClass::of(err),
            status: err.status(),
            message: err.to_string(),
            attempts,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} attempt(s): {}",
            self.class, self.attempts, self.message
        )
    }
}

impl std::error::Error for ClassifiedError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_classes() {
        assert_eq!(ErrorClass::from_status(400), ErrorClass::HttpClient);
        assert_eq!(ErrorClass::from_status(404), ErrorClass::HttpClient);
        assert_eq!(ErrorClass::from_status(429), ErrorClass::TooManyRequests);
        assert_eq!(ErrorClass::from_status(500), ErrorClass::HttpServer);
        assert_eq!(ErrorClass::from_status(503), ErrorClass::HttpServer);
    }

    #[test]
    fn test_retryable_classes() {
        let retryable = [
            TransportError::Network("connection reset".into()),
            TransportError::Timeout(Duration::from_secs(30)),
            TransportError::Http { status: 429, message: String::new() },
            TransportError::Http { status: 502, message: String::new() },
        ];
        for err in &retryable {
            assert!(
                ErrorClass::of(err).is_retryable(),
                "{:?} should be retryable",
                err
            );
        }

        let terminal = [
            TransportError::Cancelled,
            TransportError::Decode("expected struct".into()),
            TransportError::Http { status: 401, message: String::new() },
            TransportError::Http { status: 404, message: String::new() },
            TransportError::Http { status: 422, message: String::new() },
        ];
        for err in &terminal {
            assert!(
                !ErrorClass::of(err).is_retryable(),
                "{:?} should NOT be retryable",
                err
            );
        }
    }

    #[test]
    fn test_classified_error_carries_status() {
        let err = ClassifiedError::from_transport(
            &TransportError::Http {
                status: 404,
                message: "not found".into(),
            },
            1,
        );
        assert_eq!(err.class, ErrorClass::HttpClient);
        assert_eq!(err.status, Some(404));
        assert_eq!(err.attempts, 1);
        assert!(err.to_string().starts_with("http_client after 1 attempt(s)"));
    }
}
