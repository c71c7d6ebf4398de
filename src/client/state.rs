//! Observable client state and per-call outcomes.

use super::error_classification::ClassifiedError;

/// What UI code renders from: `{data, loading, error}`.
///
/// Owned by one [`FetchClient`](super::FetchClient); only that client's
/// non-superseded calls ever write it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<ClassifiedError>,
}

impl<T> Default for ClientState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

impl<T> ClientState<T> {
    pub fn is_idle(&self) -> bool {
        !self.loading
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// How one `execute`/`refetch` call resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// Fresh from the network or served from cache.
    Data(T),
    /// Terminal failure; the same error was published to the state.
    Failed(ClassifiedError),
    /// A newer call (or teardown) took over. Nothing was published.
    Superseded,
}

impl<T> FetchOutcome<T> {
    pub fn into_data(self) -> Option<T> {
        match self {
            FetchOutcome::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            FetchOutcome::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            FetchOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, FetchOutcome::Superseded)
    }
}
