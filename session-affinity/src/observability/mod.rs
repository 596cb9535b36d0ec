//! Observability of sessions.
//!
//! Sessions log through [`tracing`]. With the `metrics` feature enabled, every
//! session also keeps [`Metrics`](metrics::Metrics) about its connection
//! acquisitions and releases.

#[cfg(feature = "metrics")]
pub mod metrics;
