use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or option key that caused the error (e.g., "request.url", "retry.max_retries")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected format, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "request_validator", "config_loader")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the fetch client.
///
/// Terminal request failures are not surfaced through this type: they are
/// published as a [`ClassifiedError`](crate::client::ClassifiedError) on the
/// client state. `Error` covers what must be reported to the caller directly,
/// such as an invalid request descriptor or a broken configuration file.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request was cancelled")]
    Cancelled,
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::Transport(TransportError::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_rendered_in_display() {
        let err = Error::validation_with_context(
            "url must not be empty",
            ErrorContext::new()
                .with_field_path("request.url")
                .with_source("request_validator"),
        );
        let text = err.to_string();
        assert!(text.contains("url must not be empty"));
        assert!(text.contains("field: request.url"));
        assert!(text.contains("source: request_validator"));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("request.url")
        );
    }

    #[test]
    fn test_cancellation_detection() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::Transport(TransportError::Cancelled).is_cancelled());
        assert!(!Error::Transport(TransportError::Network("reset".into())).is_cancelled());
    }
}
