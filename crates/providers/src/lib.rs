//! Upstream media-generation providers.
//!
//! Three wire-protocol families sit behind one [`adapter::ProviderAdapter`]
//! trait: direct-sync HTTP calls, Replicate-style predictions that are
//! polled, and RunningHub-style node-graph workflows. The
//! [`supervisor`] drives a submitted job to a terminal state under a
//! wall-clock budget and a cancellation token.

pub mod adapter;
pub mod direct;
pub mod error;
pub mod http;
pub mod prediction;
pub mod settings;
pub mod supervisor;
pub mod workflow;

pub use adapter::{build_adapter, JobHandle, JobRequest, PollStatus, ProviderAdapter};
pub use error::ProviderError;
pub use settings::ProviderSettings;
pub use supervisor::{execute, JobOutcome, PollConfig};
