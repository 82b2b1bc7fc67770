//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text export
//! - `controller_metrics` - Reconciliation and requeue metrics
//! - `pipeline_metrics` - Archive fetch, cache and asset metrics

pub mod controller_metrics;
pub mod pipeline_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use pipeline_metrics::*;
pub use registry::*;
