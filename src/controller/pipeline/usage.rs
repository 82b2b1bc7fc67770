//! # Pipeline Use Counts
//!
//! Counts how many stack versions need each physical pipeline archive.
//!
//! The map is seeded from the recorded status, then adjusted by the
//! difference between the `(pipeline, version)` pairs found in status and the
//! pairs implied by the active versions of the desired spec. Pairs present in
//! both cancel out.

use super::error::PipelineError;
use super::manifest::StackAsset;
use super::source::PipelineReference;
use crate::crd::{PipelineStatus, StackVersion, StackVersionStatus};
use std::collections::{BTreeMap, BTreeSet};

/// Per-pass state for one pipeline archive
#[derive(Debug, Default)]
pub struct PipelineUsage {
    /// Last known status, including the assets applied so far
    pub status: PipelineStatus,
    pub use_count: i64,
    /// Decoded assets, loaded at most once per pass
    pub manifests: Vec<StackAsset>,
    pub manifest_error: Option<PipelineError>,
    pub skip_cert_verification: bool,
    /// Versions whose recorded status referenced this pipeline
    pub status_versions: BTreeSet<String>,
}

impl PipelineUsage {
    pub fn is_needed(&self) -> bool {
        self.use_count > 0
    }
}

#[derive(Debug, Default)]
pub struct PipelineUseMap {
    entries: BTreeMap<PipelineReference, PipelineUsage>,
}

impl PipelineUseMap {
    /// Build the map from recorded status and the desired versions
    ///
    /// Inactive spec versions do not count as desired.
    pub fn build(
        status_versions: &[StackVersionStatus],
        spec_versions: &[StackVersion],
    ) -> Result<Self, PipelineError> {
        let mut entries: BTreeMap<PipelineReference, PipelineUsage> = BTreeMap::new();
        let mut decrement: BTreeSet<(PipelineReference, String)> = BTreeSet::new();

        for version in status_versions {
            for pipeline in &version.pipelines {
                let key = PipelineReference::from_status(pipeline);
                let usage = entries.entry(key.clone()).or_insert_with(|| PipelineUsage {
                    status: pipeline.clone(),
                    ..Default::default()
                });
                usage.use_count += 1;
                usage.status_versions.insert(version.version.clone());
                decrement.insert((key, version.version.clone()));
            }
        }

        let mut increment: BTreeMap<(PipelineReference, String), &crate::crd::PipelineSpec> =
            BTreeMap::new();
        for version in spec_versions.iter().filter(|v| v.is_active()) {
            for pipeline in &version.pipelines {
                let key = PipelineReference::from_spec(pipeline);
                increment.insert((key, version.version.clone()), pipeline);
            }
        }

        for pair in &decrement {
            if increment.contains_key(pair) {
                continue;
            }
            let usage = entries
                .get_mut(&pair.0)
                .ok_or_else(|| PipelineError::UseCountInconsistent(pair.0.to_string()))?;
            usage.use_count -= 1;
        }

        for ((key, version), spec) in increment {
            let usage = entries.entry(key.clone()).or_insert_with(|| PipelineUsage {
                status: PipelineStatus {
                    name: spec.id.clone(),
                    url: key.source.url().map(str::to_string),
                    git_release: key.source.git_release().cloned(),
                    digest: key.digest.clone(),
                    active_assets: Vec::new(),
                },
                ..Default::default()
            });
            usage.skip_cert_verification |= spec.skip_cert_verification();
            if !decrement.contains(&(key, version)) {
                usage.use_count += 1;
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, key: &PipelineReference) -> Option<&PipelineUsage> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &PipelineReference) -> Option<&mut PipelineUsage> {
        self.entries.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PipelineReference, &PipelineUsage)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PipelineReference, &mut PipelineUsage)> {
        self.entries.iter_mut()
    }

    /// Pipelines no longer needed by any version
    pub fn to_delete(&self) -> impl Iterator<Item = (&PipelineReference, &PipelineUsage)> {
        self.entries.iter().filter(|(_, u)| !u.is_needed())
    }

    /// Pipelines that must be present
    pub fn to_ensure(&self) -> impl Iterator<Item = (&PipelineReference, &PipelineUsage)> {
        self.entries.iter().filter(|(_, u)| u.is_needed())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
