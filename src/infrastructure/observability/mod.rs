//! Prometheus metrics for training and prediction.
//!
//! Nothing is served over the network; the registry is rendered to text on demand.

pub mod metrics;

pub use metrics::Metrics;
