//! Mixhound Core Library
//!
//! This library turns a natural-language mood or genre request into a ranked,
//! deduplicated set of playable tracks and acquires them to local storage.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`retry`] - Retry policies, error classification and the backoff executor
//! - [`cache`] - Disk-backed, TTL-indexed JSON cache
//! - [`parser`] - Free-text recommendation parsing into song candidates
//! - [`provider`] - Recommendation providers and the fallback orchestrator
//! - [`search`] - Two-tier search resolution into playable tracks
//! - [`download`] - Downloaded-items ledger, space guard and acquisition
//! - [`pipeline`] - End-to-end discovery flow
//! - [`config`] - Configuration loading and validation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod download;
pub mod http_client;
pub mod parser;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod search;

mod persist;
mod user_agent;

// Re-export commonly used types
pub use cache::Cache;
pub use config::{ConfigError, Configuration, FileConfig, LoadedConfig};
pub use download::{
    AcquireError, AcquireOutcome, Acquirer, DownloadError, DownloadLedger, TrackTransfer,
};
pub use parser::{SongCandidate, parse_recommendations};
pub use pipeline::{Discovery, DiscoveryPipeline, PipelineError, Unresolved};
pub use provider::{ProviderError, ProviderOrchestrator, RecommendError, RecommendationProvider};
pub use retry::{Classify, ErrorKind, RetryError, RetryExecutor, RetryPolicy};
pub use search::{ResolvedTrack, SearchError, SearchResolver, SearchTarget};
