//! # Watch Loop
//!
//! Drives the kube-runtime controller over Stack resources.

use super::error_policy::{error_policy, handle_watch_stream_error};
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::Stack;
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    stacks: Api<Stack>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    Controller::new(stacks, watcher::Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, _action)) => {
                    debug!("Reconciled {}/{}", object.namespace.as_deref().unwrap_or_default(), object.name);
                }
                Err(kube_runtime::controller::Error::ReconcilerFailed(_, object)) => {
                    // Already logged and requeued by the error policy
                    debug!("Reconcile of {} failed", object.name);
                }
                Err(e) => handle_watch_stream_error(&format!("{e:?}")).await,
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped");
    Ok(())
}
