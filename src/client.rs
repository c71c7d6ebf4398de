//! Client surface: what UI code holds.
//!
//! Keep the public surface small and predictable. Implementation details are
//! split into submodules under `src/client/`.

pub mod builder;
mod callbacks;
pub mod core;
pub mod error_classification;
pub mod execution;
pub mod options;
pub mod state;

pub use builder::ClientBuilder;
pub use callbacks::{ErrorHook, FinallyHook, SuccessHook};
pub use core::FetchClient;
pub use error_classification::{ClassifiedError, ErrorClass};
pub use execution::{AttemptOutcome, AttemptRecord, CacheMode, RequestExecutor};
pub use options::{
    CacheConfig, RequestDescriptor, RequestOptions, RequestOptionsBuilder, RequestOverrides,
};
pub use state::{ClientState, FetchOutcome};
