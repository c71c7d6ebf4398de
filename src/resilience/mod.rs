//! 弹性模式模块：重试、取消与防抖。
//!
//! # Resilience Primitives Module
//!
//! The coordination pieces the request executor is built from. Each one is
//! usable on its own and independently testable.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry`] | Failure-class-aware retry policy with a fixed (or opt-in exponential) delay |
//! | [`cancel`] | Per-requester cancellation scope; a new request supersedes the previous one |
//! | [`debounce`] | Quiet-period coordinator collapsing bursts of calls into one execution |
//!
//! ## Retry
//!
//! ```rust
//! use resilient_fetch::client::ErrorClass;
//! use resilient_fetch::resilience::retry::{Decision, RetryConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(RetryConfig::fixed(3, Duration::from_millis(1000)));
//! assert_eq!(
//!     policy.decide(ErrorClass::HttpServer, 0),
//!     Decision::Retry { delay: Duration::from_millis(1000) }
//! );
//! assert_eq!(policy.decide(ErrorClass::HttpClient, 0), Decision::Fail);
//! ```
//!
//! ## Cancellation
//!
//! ```rust
//! use resilient_fetch::resilience::cancel::{next_scope_key, CancellationScope};
//!
//! let scope = CancellationScope::new();
//! let key = next_scope_key();
//! let first = scope.begin(key);
//! let second = scope.begin(key);
//! assert!(first.is_cancelled());
//! assert!(scope.is_current(&second));
//! ```

pub mod cancel;
pub mod debounce;
pub mod retry;
