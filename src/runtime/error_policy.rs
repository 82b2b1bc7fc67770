//! # Error Policy
//!
//! Error handling and backoff for the controller watch loop.

use crate::constants;
use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::Stack;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed Stack with per-resource Fibonacci backoff
pub fn error_policy(stack: Arc<Stack>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    let name = stack.name_any();
    let namespace = stack.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {:?}", namespace, name, error);
    observability::metrics::increment_reconciliation_errors();

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(resource_key).or_insert_with(BackoffState::new);
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    let next_trigger_time = chrono::Utc::now() + chrono::Duration::seconds(backoff_seconds as i64);
    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {}), next attempt at {}",
        backoff_seconds,
        error_count,
        next_trigger_time.to_rfc3339()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Watch stream error classes that need different handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

/// Classify a stringified watch error
pub fn classify_watch_error(error: &str) -> WatchErrorKind {
    if error.contains("401") || error.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error.contains("410") || error.contains("too old resource version") || error.contains("Gone") {
        WatchErrorKind::Expired
    } else if error.contains("429") || error.contains("TooManyRequests") {
        WatchErrorKind::Throttled
    } else if error.contains("ObjectNotFound") || (error.contains("404") && error.contains("not found")) {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch stream error and wait out its delay
pub async fn handle_watch_stream_error(error: &str) {
    match classify_watch_error(error) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("Verify: kubectl auth can-i watch stacks.kabanero.io --as=system:serviceaccount:<namespace>:stack-controller");
            tokio::time::sleep(Duration::from_secs(constants::DEFAULT_WATCH_RESTART_DELAY_SECS)).await;
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will relist");
        }
        WatchErrorKind::Throttled => {
            warn!("API server throttling watch (429), backing off");
            tokio::time::sleep(Duration::from_secs(constants::DEFAULT_WATCH_RESTART_DELAY_SECS)).await;
        }
        WatchErrorKind::NotFound => {
            warn!("Resource not found (likely deleted), continuing watch...");
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error);
        }
    }
}
