//! # resilient-fetch
//!
//! 面向界面代码的弹性数据请求客户端：共享 TTL 缓存、分类重试、防抖合并与请求取代。
//!
//! A resilient data-fetching client for UI code. It issues requests on behalf
//! of a view and keeps a small observable `{data, loading, error}` state up to
//! date while handling the awkward parts of talking to a flaky backend.
//!
//! ## Key Features
//!
//! - **Shared cache**: time-bounded responses shared across clients through one
//!   injected [`CacheStore`]
//! - **Classified retries**: network failures, timeouts, 5xx and 429 are retried
//!   with a fixed delay; other 4xx fail on the first attempt
//! - **Debounce**: bursts of calls collapse into one request carrying the last
//!   call's parameters
//! - **Supersession**: a new call cancels the previous in-flight one, whose
//!   result is then discarded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_fetch::{CacheStore, FetchClient, RequestOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> resilient_fetch::Result<()> {
//!     let store = CacheStore::shared();
//!     store.start();
//!
//!     let options = RequestOptions::builder("https://api.example.com/services")
//!         .cache_ttl(Duration::from_secs(300))
//!         .build()?;
//!     let client = FetchClient::<serde_json::Value>::builder(options)
//!         .cache_store(store)
//!         .build()?;
//!
//!     let outcome = client.execute().await?;
//!     println!("{:?}", outcome.into_data());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | `FetchClient`, request options, executor and observable state |
//! | [`cache`] | TTL cache store and cache key derivation |
//! | [`resilience`] | Retry policy, cancellation scope and debounce coordinator |
//! | [`transport`] | Transport trait and the `reqwest` implementation |
//! | [`config`] | File/env configuration and timeout policy |

pub mod cache;
pub mod client;
pub mod config;
pub mod resilience;
pub mod transport;

// Re-export main types for convenience
pub use cache::CacheStore;
pub use client::{
    ClassifiedError, ClientBuilder, ClientState, ErrorClass, FetchClient, FetchOutcome,
    RequestOptions, RequestOverrides,
};
pub use config::ClientConfig;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
