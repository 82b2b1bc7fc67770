//! # Version Reconciliation
//!
//! Activates the pipelines of a Stack and rebuilds its status from the spec.

use super::types::ReconcilerError;
use crate::controller::pipeline::render::{STACK_ID_KEY, STACK_NAME_KEY};
use crate::controller::pipeline::{
    activate_pipelines, ActivationContext, ArchiveTransport, AssetOwner, ObjectStore,
    PipelineReference, PipelineUseMap, RenderContext, Renderer,
};
use crate::crd::{
    AssetState, DesiredState, PipelineStatus, Stack, StackSpec, StackStatus, StackVersionStatus,
};
use kube::{Resource, ResourceExt};
use tracing::{debug, info_span, Instrument};

pub const INACTIVE_VERSION_MESSAGE: &str = "The stack version has been deactivated.";
pub const REMOVED_VERSION_MESSAGE: &str =
    "The stack version was removed from the spec; assets are pending deletion.";

/// Collaborators used by a reconcile pass
#[derive(Clone, Copy)]
pub struct ReconcileEnv<'a> {
    pub store: &'a dyn ObjectStore,
    pub transport: &'a dyn ArchiveTransport,
    pub renderer: &'a dyn Renderer,
}

impl std::fmt::Debug for ReconcileEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileEnv").finish_non_exhaustive()
    }
}

fn render_context(stack: &Stack) -> RenderContext {
    let id = stack.name_any();
    let name = if stack.spec.name.is_empty() {
        id.clone()
    } else {
        stack.spec.name.clone()
    };
    RenderContext::from([
        (STACK_ID_KEY.to_string(), id),
        (STACK_NAME_KEY.to_string(), name),
    ])
}

/// Converge the cluster to the Stack's active versions and return the new status
pub async fn reconcile_active_versions(
    stack: &Stack,
    env: ReconcileEnv<'_>,
) -> Result<StackStatus, ReconcilerError> {
    let namespace = stack
        .namespace()
        .ok_or(ReconcilerError::MissingObjectKey(".metadata.namespace"))?;
    let owner = stack
        .owner_ref(&())
        .ok_or(ReconcilerError::MissingObjectKey(".metadata.uid"))?;

    let span = info_span!(
        "stack.reconcile_active_versions",
        resource.name = %stack.name_any(),
        resource.namespace = %namespace,
    );

    async move {
        let current = stack.status.clone().unwrap_or_default();
        let mut map = PipelineUseMap::build(&current.versions, &stack.spec.versions)?;
        debug!("Built pipeline use map with {} entries", map.len());

        let ctx = ActivationContext {
            store: env.store,
            transport: env.transport,
            renderer: env.renderer,
            owner: AssetOwner {
                reference: owner,
                namespace: namespace.clone(),
            },
            target_namespace: namespace,
            render_context: render_context(stack),
        };
        activate_pipelines(&mut map, &ctx).await;

        Ok(build_status(&stack.spec, &current, &map))
    }
    .instrument(span)
    .await
}

/// Pipelines of a version whose assets still await deletion
fn residual_pipelines(map: &PipelineUseMap, version: &str) -> Vec<PipelineStatus> {
    map.to_delete()
        .filter(|(_, usage)| {
            usage.status_versions.contains(version) && !usage.status.active_assets.is_empty()
        })
        .map(|(_, usage)| usage.status.clone())
        .collect()
}

/// Status in spec order, followed by removed versions that still hold assets
pub fn build_status(spec: &StackSpec, current: &StackStatus, map: &PipelineUseMap) -> StackStatus {
    let mut versions = Vec::with_capacity(spec.versions.len());

    for version in &spec.versions {
        let location = current
            .versions
            .iter()
            .find(|v| v.version == version.version)
            .and_then(|v| v.location.clone());

        if !version.is_active() {
            versions.push(StackVersionStatus {
                version: version.version.clone(),
                location,
                pipelines: residual_pipelines(map, &version.version),
                status: Some(DesiredState::Inactive),
                status_message: Some(INACTIVE_VERSION_MESSAGE.to_string()),
            });
            continue;
        }

        let mut errors = Vec::new();
        let pipelines = version
            .pipelines
            .iter()
            .map(|pipeline| {
                let key = PipelineReference::from_spec(pipeline);
                let usage = map.get(&key);
                if let Some(err) = usage.and_then(|u| u.manifest_error.as_ref()) {
                    errors.push(format!("Pipeline {}: {}", pipeline.id, err));
                }
                PipelineStatus {
                    name: pipeline.id.clone(),
                    url: key.source.url().map(str::to_string),
                    git_release: key.source.git_release().cloned(),
                    digest: key.digest.clone(),
                    active_assets: usage
                        .map(|u| u.status.active_assets.clone())
                        .unwrap_or_default(),
                }
            })
            .collect();

        versions.push(StackVersionStatus {
            version: version.version.clone(),
            location,
            pipelines,
            status: Some(DesiredState::Active),
            status_message: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        });
    }

    for previous in &current.versions {
        if spec.versions.iter().any(|v| v.version == previous.version) {
            continue;
        }
        let pipelines = residual_pipelines(map, &previous.version);
        if pipelines.is_empty() {
            continue;
        }
        versions.push(StackVersionStatus {
            version: previous.version.clone(),
            location: previous.location.clone(),
            pipelines,
            status: Some(DesiredState::Inactive),
            status_message: Some(REMOVED_VERSION_MESSAGE.to_string()),
        });
    }

    let active = versions
        .iter()
        .filter(|v| v.status == Some(DesiredState::Active))
        .count();
    let failed = versions
        .iter()
        .flat_map(|v| &v.pipelines)
        .flat_map(|p| &p.active_assets)
        .filter(|a| a.status == AssetState::Failed)
        .count();

    StackStatus {
        versions,
        summary: Some(format!("{active} active versions, {failed} failed assets")),
    }
}
