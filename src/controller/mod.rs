//! # Controller
//!
//! Stack controller: pipeline asset engine, reconciler, backoff and the
//! probes/metrics HTTP server.

pub mod backoff;
pub mod pipeline;
pub mod reconciler;
pub mod server;
