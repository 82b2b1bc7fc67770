//! # Custom Resource Definitions
//!
//! CRD types for the Stack controller.
//!
//! A `Stack` declares one or more versions, each pointing at pipeline archives
//! that are unpacked into Tekton assets in the Stack's namespace.

mod status;

pub use status::*;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stack Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: kabanero.io/v1alpha2
/// kind: Stack
/// metadata:
///   name: java-microprofile
///   namespace: kabanero
/// spec:
///   name: java-microprofile
///   versions:
///     - version: 0.2.19
///       desiredState: active
///       pipelines:
///         - id: default
///           sha256: 8080cc3a...
///           https:
///             url: https://github.com/kabanero-io/pipelines/releases/download/0.6.0/default-kabanero-pipelines.tar.gz
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[kube(
    kind = "Stack",
    group = "kabanero.io",
    version = "v1alpha2",
    namespaced,
    status = "StackStatus",
    shortname = "stk",
    printcolumn = r#"{"name":"Summary", "type":"string", "jsonPath":".status.summary"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    /// Stack name, exposed to pipeline templates as `StackName`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub versions: Vec<StackVersion>,
}

/// One version of a stack
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackVersion {
    pub version: String,
    /// Whether this version's pipelines should be present in the cluster
    #[serde(default)]
    pub desired_state: DesiredState,
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
}

impl StackVersion {
    pub fn is_active(&self) -> bool {
        self.desired_state == DesiredState::Active
    }
}

/// Desired (and reported) state of a stack version
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Active,
    Inactive,
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesiredState::Active => write!(f, "active"),
            DesiredState::Inactive => write!(f, "inactive"),
        }
    }
}

/// A pipeline archive referenced by a stack version
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Pipeline id, used as the pipeline name in status
    pub id: String,
    /// Hex SHA-256 of the archive
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<HttpsSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_release: Option<GitReleaseSpec>,
}

impl PipelineSpec {
    /// True when either source asks for TLS verification to be skipped
    pub fn skip_cert_verification(&self) -> bool {
        self.https
            .as_ref()
            .is_some_and(|h| h.skip_cert_verification)
            || self
                .git_release
                .as_ref()
                .is_some_and(|g| g.skip_cert_verification)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpsSource {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub skip_cert_verification: bool,
}

/// Git release coordinates plus transport options
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitReleaseSpec {
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
    #[serde(default)]
    pub skip_cert_verification: bool,
}

impl GitReleaseSpec {
    pub fn info(&self) -> GitReleaseInfo {
        GitReleaseInfo {
            hostname: self.hostname.clone(),
            organization: self.organization.clone(),
            project: self.project.clone(),
            release: self.release.clone(),
            asset_name: self.asset_name.clone(),
        }
    }
}
