#![deny(missing_docs)]

//! Shared configuration, error types, IDs, and observability primitives for fmr crates.
//!
//! Architecture role:
//! - defines tracker configuration passed across layers
//! - provides common [`FmrError`] / [`Result`] contracts
//! - hosts typed identifiers and metrics utilities
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

/// Shared tracker configuration types.
pub mod config;
/// Shared error taxonomy.
pub mod error;
/// Strongly-typed identifier wrappers.
pub mod ids;
/// Metrics registry and Prometheus rendering helpers.
pub mod metrics;

pub use config::TrackerConfig;
pub use error::{FmrError, Result};
pub use ids::{JobId, JobIdSource, NodeId};
pub use metrics::MetricsRegistry;
