//! # Reconciler Types
//!
//! Core types for the reconciler: context, errors and per-resource backoff.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::pipeline::{
    ArchiveCache, ArchiveTransport, DirectiveRenderer, HttpArchiveTransport, KubeObjectStore,
    ObjectStore, PipelineError, Renderer,
};
use anyhow::Result;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Stack is missing {0}")]
    MissingObjectKey(&'static str),

    #[error("Pipeline bookkeeping failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Failed to update Stack status: {0}")]
    StatusUpdate(#[source] kube::Error),
}

/// Backoff state for a single resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
        self.error_count = 0;
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared reconcile context
pub struct Reconciler {
    pub client: Client,
    pub config: ControllerConfig,
    pub store: Arc<dyn ObjectStore>,
    pub transport: Arc<dyn ArchiveTransport>,
    pub renderer: Arc<dyn Renderer>,
    pub archive_cache: ArchiveCache,
    /// Per-resource backoff, keyed by `namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(client: Client, config: ControllerConfig) -> Result<Self> {
        let archive_cache = ArchiveCache::new();
        let transport = HttpArchiveTransport::new(&config, archive_cache.clone())?;
        Ok(Self {
            store: Arc::new(KubeObjectStore::new(client.clone())),
            transport: Arc::new(transport),
            renderer: Arc::new(DirectiveRenderer),
            archive_cache,
            client,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        })
    }

    /// Forget the error history of a resource after a successful reconcile
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
