//! # Pipeline Metrics
//!
//! Archive downloads, conditional-cache hits and asset outcomes.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter};
use std::sync::LazyLock;

static ARCHIVE_FETCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stack_controller_archive_fetches_total",
        "Total number of pipeline archive fetches",
    )
    .expect("Failed to create ARCHIVE_FETCHES_TOTAL metric - this should never happen")
});

static ARCHIVE_FETCH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stack_controller_archive_fetch_errors_total",
        "Total number of pipeline archive fetch or verification failures",
    )
    .expect("Failed to create ARCHIVE_FETCH_ERRORS_TOTAL metric - this should never happen")
});

static ARCHIVE_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "stack_controller_archive_fetch_duration_seconds",
            "Duration of pipeline archive fetch and decode in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create ARCHIVE_FETCH_DURATION metric - this should never happen")
});

static ARCHIVE_CACHE_HITS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stack_controller_archive_cache_hits_total",
        "Total number of archive downloads answered with 304 Not Modified",
    )
    .expect("Failed to create ARCHIVE_CACHE_HITS_TOTAL metric - this should never happen")
});

static ASSETS_APPLIED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stack_controller_assets_applied_total",
        "Total number of pipeline assets created in the cluster",
    )
    .expect("Failed to create ASSETS_APPLIED_TOTAL metric - this should never happen")
});

static ASSETS_FAILED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stack_controller_assets_failed_total",
        "Total number of pipeline assets that could not be applied",
    )
    .expect("Failed to create ASSETS_FAILED_TOTAL metric - this should never happen")
});

static ASSETS_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stack_controller_assets_deleted_total",
        "Total number of pipeline assets released by a Stack",
    )
    .expect("Failed to create ASSETS_DELETED_TOTAL metric - this should never happen")
});

/// Register pipeline metrics with the registry
pub(crate) fn register_pipeline_metrics() -> Result<()> {
    REGISTRY.register(Box::new(ARCHIVE_FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARCHIVE_FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARCHIVE_FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(ARCHIVE_CACHE_HITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ASSETS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ASSETS_FAILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ASSETS_DELETED_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_archive_fetches() {
    ARCHIVE_FETCHES_TOTAL.inc();
}

pub fn increment_archive_fetch_errors() {
    ARCHIVE_FETCH_ERRORS_TOTAL.inc();
}

pub fn observe_archive_fetch_duration(duration: f64) {
    ARCHIVE_FETCH_DURATION.observe(duration);
}

pub fn increment_archive_cache_hits() {
    ARCHIVE_CACHE_HITS_TOTAL.inc();
}

pub fn increment_assets_applied() {
    ASSETS_APPLIED_TOTAL.inc();
}

pub fn increment_assets_failed() {
    ASSETS_FAILED_TOTAL.inc();
}

pub fn increment_assets_deleted() {
    ASSETS_DELETED_TOTAL.inc();
}
