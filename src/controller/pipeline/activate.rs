//! # Pipeline Activation
//!
//! Converges the cluster to a [`PipelineUseMap`]: assets of pipelines no
//! longer needed are deleted (or disowned), assets of needed pipelines are
//! created or adopted. Per-asset failures are recorded in that asset's status
//! and never abort the pass.

use super::assets::{
    adopt_asset, create_asset, delete_asset, is_allowed_group, pending_status, status_gvk,
    AssetOwner, DeleteOutcome, GROUP_REJECTED_MESSAGE,
};
use super::fetch::get_manifests;
use super::http_cache::ArchiveTransport;
use super::render::{RenderContext, Renderer, DIGEST_KEY};
use super::source::PipelineReference;
use super::store::ObjectStore;
use super::usage::{PipelineUsage, PipelineUseMap};
use crate::crd::AssetState;
use crate::observability;
use tracing::{error, info, warn};

pub const MANIFESTS_UNAVAILABLE_MESSAGE: &str = "Manifests are no longer available at specified URL";

/// Collaborators and identity for one activation pass
pub struct ActivationContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub transport: &'a dyn ArchiveTransport,
    pub renderer: &'a dyn Renderer,
    pub owner: AssetOwner,
    /// Namespace assets go to unless their kind keeps its own
    pub target_namespace: String,
    /// Base render context; `Digest` is set per pipeline
    pub render_context: RenderContext,
}

impl std::fmt::Debug for ActivationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationContext")
            .field("owner", &self.owner)
            .field("target_namespace", &self.target_namespace)
            .finish_non_exhaustive()
    }
}

impl ActivationContext<'_> {
    fn context_for(&self, reference: &PipelineReference) -> RenderContext {
        let mut context = self.render_context.clone();
        context.insert(DIGEST_KEY.to_string(), reference.short_digest());
        context
    }

    /// Fetch and decode the manifests of a pipeline into `usage`
    async fn load_manifests(&self, reference: &PipelineReference, usage: &mut PipelineUsage) -> bool {
        let context = self.context_for(reference);
        match get_manifests(
            self.transport,
            self.renderer,
            reference,
            &usage.status.name,
            &context,
            usage.skip_cert_verification,
        )
        .await
        {
            Ok(manifests) => {
                usage.manifests = manifests;
                usage.manifest_error = None;
                true
            }
            Err(e) => {
                error!("Error retrieving archive manifests for {}: {}", reference, e);
                usage.manifest_error = Some(e);
                false
            }
        }
    }
}

/// Delete pass, then ensure pass
pub async fn activate_pipelines(map: &mut PipelineUseMap, ctx: &ActivationContext<'_>) {
    for (reference, usage) in map.iter_mut().filter(|(_, u)| !u.is_needed()) {
        info!(
            "Deleting assets with use count {}: {}",
            usage.use_count, reference
        );
        delete_pipeline_assets(usage, ctx).await;
    }

    for (reference, usage) in map.iter_mut().filter(|(_, u)| u.is_needed()) {
        info!(
            "Creating assets with use count {}: {}",
            usage.use_count, reference
        );
        ensure_pipeline_assets(reference, usage, ctx).await;
    }
}

async fn delete_pipeline_assets(usage: &mut PipelineUsage, ctx: &ActivationContext<'_>) {
    let mut remaining = Vec::new();
    for mut asset in std::mem::take(&mut usage.status.active_assets) {
        match delete_asset(ctx.store, &asset, &ctx.target_namespace, &ctx.owner).await {
            Ok(DeleteOutcome::Skipped | DeleteOutcome::AlreadyGone | DeleteOutcome::NotOwned) => {}
            Ok(DeleteOutcome::Deleted | DeleteOutcome::Disowned) => {
                observability::metrics::increment_assets_deleted();
            }
            Err(e) => {
                warn!("Unable to delete asset {}: {:#}", asset.name, e);
                // Still active, so the next pass retries the delete
                asset.status_message = Some(format!("Unable to delete asset: {e:#}"));
                remaining.push(asset);
            }
        }
    }
    usage.status.active_assets = remaining;
}

async fn ensure_pipeline_assets(
    reference: &PipelineReference,
    usage: &mut PipelineUsage,
    ctx: &ActivationContext<'_>,
) {
    if usage.status.active_assets.is_empty() {
        if !ctx.load_manifests(reference, usage).await {
            return;
        }
        usage.status.active_assets = usage
            .manifests
            .iter()
            .map(|m| pending_status(m, &ctx.target_namespace))
            .collect();
    }

    let mut manifests_attempted = !usage.manifests.is_empty() || usage.manifest_error.is_some();

    for index in 0..usage.status.active_assets.len() {
        if usage.status.active_assets[index].namespace.is_empty() {
            usage.status.active_assets[index].namespace = ctx.target_namespace.clone();
        }
        let asset = usage.status.active_assets[index].clone();
        let gvk = status_gvk(&asset);

        let existing = match ctx.store.get(&gvk, &asset.namespace, &asset.name).await {
            Ok(existing) => existing,
            Err(e) => {
                error!("Unable to check asset name {}: {:#}", asset.name, e);
                usage.status.active_assets[index]
                    .set(AssetState::Unknown, format!("Unable to check asset: {e:#}"));
                continue;
            }
        };

        if let Some(object) = existing {
            if let Err(e) = adopt_asset(ctx.store, &gvk, &asset.namespace, object, &ctx.owner).await {
                error!("Unable to add owner reference to {}: {:#}", asset.name, e);
            }
            usage.status.active_assets[index].set(AssetState::Active, "");
            continue;
        }

        if usage.manifests.is_empty() && !manifests_attempted {
            manifests_attempted = true;
            ctx.load_manifests(reference, usage).await;
        }
        if usage.manifests.is_empty() {
            error!(
                "Object {} not found and manifests not available: {}",
                asset.name, reference
            );
            usage.status.active_assets[index].set(AssetState::Failed, MANIFESTS_UNAVAILABLE_MESSAGE);
            observability::metrics::increment_assets_failed();
            continue;
        }

        // Duplicate names within an archive: the last one wins
        let Some(manifest) = usage.manifests.iter().rev().find(|m| m.name == asset.name) else {
            usage.status.active_assets[index].set(
                AssetState::Failed,
                format!("Asset {} is not present in the pipeline manifests", asset.name),
            );
            observability::metrics::increment_assets_failed();
            continue;
        };

        if !is_allowed_group(&manifest.group) {
            usage.status.active_assets[index].set(AssetState::Failed, GROUP_REJECTED_MESSAGE);
            observability::metrics::increment_assets_failed();
            continue;
        }

        match create_asset(ctx.store, manifest, &asset.namespace, &ctx.owner).await {
            Ok(()) => {
                observability::metrics::increment_assets_applied();
                usage.status.active_assets[index].set(AssetState::Active, "");
            }
            Err(e) => {
                error!("Error installing the resource {}: {:#}", asset.name, e);
                observability::metrics::increment_assets_failed();
                usage.status.active_assets[index].set(AssetState::Failed, format!("{e:#}"));
            }
        }
    }
}
