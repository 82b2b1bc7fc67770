//! Stack Controller Library
//!
//! Core of the Stack operator: pipeline archive fetch and verification,
//! manifest decoding, use-count tracking and asset reconciliation.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;

pub use crd::*;
