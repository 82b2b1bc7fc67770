//! # Status Management
//!
//! Writes the rebuilt Stack status back to the API server.

use super::types::{Reconciler, ReconcilerError};
use crate::constants::FIELD_MANAGER;
use crate::crd::{Stack, StackStatus};
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use tracing::debug;

/// Whether the recorded status differs from `status`
pub fn status_changed(stack: &Stack, status: &StackStatus) -> bool {
    stack.status.as_ref() != Some(status)
}

/// Patch the status subresource, skipping the write when nothing changed
///
/// Returns whether a patch was sent.
pub async fn update_stack_status(
    reconciler: &Reconciler,
    stack: &Stack,
    status: &StackStatus,
) -> Result<bool, ReconcilerError> {
    // Unchanged status would only generate another watch event
    if !status_changed(stack, status) {
        debug!("Skipping status update for {} - status unchanged", stack.name_any());
        return Ok(false);
    }

    let namespace = stack
        .namespace()
        .ok_or(ReconcilerError::MissingObjectKey(".metadata.namespace"))?;
    let api: Api<Stack> = Api::namespaced(reconciler.client.clone(), &namespace);

    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &stack.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await
    .map_err(ReconcilerError::StatusUpdate)?;

    Ok(true)
}
