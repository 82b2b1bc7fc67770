//! # Stack Status
//!
//! Persisted per-version, per-pipeline and per-asset state.

use super::DesiredState;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the Stack resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    #[serde(default)]
    pub versions: Vec<StackVersionStatus>,
    /// Short human-readable summary, e.g. "2 active versions, 0 failed assets"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackVersionStatus {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub pipelines: Vec<PipelineStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DesiredState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_release: Option<GitReleaseInfo>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub active_assets: Vec<RepositoryAssetStatus>,
}

/// Coordinates of a release asset on a GitHub (or GitHub Enterprise) host
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct GitReleaseInfo {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub asset_name: String,
}

impl GitReleaseInfo {
    /// All coordinates are present
    pub fn is_usable(&self) -> bool {
        !self.hostname.is_empty()
            && !self.organization.is_empty()
            && !self.project.is_empty()
            && !self.release.is_empty()
            && !self.asset_name.is_empty()
    }
}

/// State of an individual asset
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    Active,
    Failed,
    #[default]
    Unknown,
}

impl std::fmt::Display for AssetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetState::Active => write!(f, "active"),
            AssetState::Failed => write!(f, "failed"),
            AssetState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Persisted status of one cluster object created from a pipeline archive
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryAssetStatus {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub status: AssetState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl RepositoryAssetStatus {
    pub fn set(&mut self, state: AssetState, message: impl Into<String>) {
        let message = message.into();
        self.status = state;
        self.status_message = if message.is_empty() { None } else { Some(message) };
    }
}
