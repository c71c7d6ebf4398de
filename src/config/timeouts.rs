use std::env;
use std::time::Duration;

/// Per-request timeout selection.
///
/// Requests whose URL contains one of `long_running_paths` (AI endpoints by
/// default) get the long timeout; everything else gets the default. An
/// explicit timeout on the request always wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub default: Duration,
    pub long: Duration,
    pub long_running_paths: Vec<String>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            long: Duration::from_secs(60),
            long_running_paths: vec!["/api/ia/".to_string()],
        }
    }
}

impl TimeoutPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `FETCH_HTTP_TIMEOUT_SECS` / `FETCH_HTTP_LONG_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = env_secs("FETCH_HTTP_TIMEOUT_SECS") {
            self.default = secs;
        }
        if let Some(secs) = env_secs("FETCH_HTTP_LONG_TIMEOUT_SECS") {
            self.long = secs;
        }
        self
    }

    pub fn with_default(mut self, timeout: Duration) -> Self {
        self.default = timeout;
        self
    }

    pub fn with_long(mut self, timeout: Duration) -> Self {
        self.long = timeout;
        self
    }

    pub fn with_long_running_path(mut self, fragment: impl Into<String>) -> Self {
        self.long_running_paths.push(fragment.into());
        self
    }

    pub fn timeout_for(&self, url: &str) -> Duration {
        if self
            .long_running_paths
            .iter()
            .any(|fragment| !fragment.is_empty() && url.contains(fragment.as_str()))
        {
            self.long
        } else {
            self.default
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_endpoints_get_long_timeout() {
        let policy = TimeoutPolicy::default();
        assert_eq!(
            policy.timeout_for("/api/ia/analyse"),
            Duration::from_secs(60)
        );
        assert_eq!(
            policy.timeout_for("https://host/api/ia/predict?x=1"),
            Duration::from_secs(60)
        );
        assert_eq!(policy.timeout_for("/api/services"), Duration::from_secs(30));
    }

    #[test]
    fn test_custom_fragments() {
        let policy = TimeoutPolicy::new()
            .with_default(Duration::from_secs(5))
            .with_long(Duration::from_secs(120))
            .with_long_running_path("/upload");
        assert_eq!(policy.timeout_for("/media/upload"), Duration::from_secs(120));
        assert_eq!(policy.timeout_for("/media/list"), Duration::from_secs(5));
    }
}
