//! # Reconciler
//!
//! Reconciles Stack resources: activates the pipelines of every active
//! version, removes assets no version needs any more and records the result
//! in the Stack status.

pub mod status;
pub mod types;
pub mod versions;

pub use status::{status_changed, update_stack_status};
pub use types::{BackoffState, Reconciler, ReconcilerError};
pub use versions::{build_status, reconcile_active_versions, ReconcileEnv};

use crate::crd::Stack;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, Instrument};

/// Reconcile entry point for the controller runtime
pub async fn reconcile(stack: Arc<Stack>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = stack.name_any();
    let namespace = stack.namespace().unwrap_or_default();
    let resource_key = format!("{namespace}/{name}");

    let span = info_span!(
        "controller.reconcile",
        resource.name = %name,
        resource.namespace = %namespace,
        resource.kind = "Stack",
        operation.success = tracing::field::Empty,
        operation.duration_ms = tracing::field::Empty,
    );
    let span_clone = span.clone();
    let start = Instant::now();

    async move {
        observability::metrics::increment_reconciliations();
        info!("Reconciling Stack {}", resource_key);

        let env = ReconcileEnv {
            store: ctx.store.as_ref(),
            transport: ctx.transport.as_ref(),
            renderer: ctx.renderer.as_ref(),
        };
        let status = reconcile_active_versions(&stack, env).await?;
        let patched = update_stack_status(&ctx, &stack, &status).await?;

        let elapsed = start.elapsed();
        observability::metrics::observe_reconciliation_duration(elapsed.as_secs_f64());
        span_clone.record("operation.duration_ms", elapsed.as_millis() as u64);
        span_clone.record("operation.success", true);
        info!(
            "Reconciled Stack {} in {}ms (status {}): {}",
            resource_key,
            elapsed.as_millis(),
            if patched { "updated" } else { "unchanged" },
            status.summary.as_deref().unwrap_or_default()
        );

        ctx.reset_backoff(&resource_key);
        observability::metrics::increment_requeues_total("periodic");
        Ok(Action::requeue(Duration::from_secs(ctx.config.reconcile_interval_secs)))
    }
    .instrument(span)
    .await
}
