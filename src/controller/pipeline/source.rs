//! # Pipeline Sources
//!
//! Identity of a physical pipeline archive, independent of the stack version
//! that declares it.

use super::error::PipelineError;
use crate::crd::{GitReleaseInfo, PipelineSpec, PipelineStatus};
use std::fmt;

/// Where an archive is fetched from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineSource {
    Https { url: String },
    GitRelease(GitReleaseInfo),
}

impl PipelineSource {
    /// Complete git release coordinates win over a URL. With neither, an empty
    /// URL is kept and fetching fails with [`PipelineError::NoSource`].
    pub fn resolve(url: Option<&str>, git_release: Option<&GitReleaseInfo>) -> Self {
        match git_release {
            Some(info) if info.is_usable() => PipelineSource::GitRelease(info.clone()),
            _ => PipelineSource::Https {
                url: url.unwrap_or_default().to_string(),
            },
        }
    }

    /// The name the file type is classified by
    pub fn file_name(&self) -> &str {
        match self {
            PipelineSource::Https { url } => {
                let path = url.split(['?', '#']).next().unwrap_or_default();
                path.rsplit('/').next().unwrap_or_default()
            }
            PipelineSource::GitRelease(info) => &info.asset_name,
        }
    }

    pub fn file_type(&self) -> Result<FileType, PipelineError> {
        FileType::classify(self.file_name())
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            PipelineSource::Https { url } => Some(url),
            PipelineSource::GitRelease(_) => None,
        }
    }

    pub fn git_release(&self) -> Option<&GitReleaseInfo> {
        match self {
            PipelineSource::Https { .. } => None,
            PipelineSource::GitRelease(info) => Some(info),
        }
    }
}

impl fmt::Display for PipelineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineSource::Https { url } => write!(f, "{url}"),
            PipelineSource::GitRelease(info) => write!(
                f,
                "{}/{}/{}@{}:{}",
                info.hostname, info.organization, info.project, info.release, info.asset_name
            ),
        }
    }
}

/// Archive payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    TarGz,
    Yaml,
}

impl FileType {
    pub fn classify(name: &str) -> Result<Self, PipelineError> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(FileType::TarGz)
        } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            Ok(FileType::Yaml)
        } else {
            Err(PipelineError::UnsupportedFileType(name.to_string()))
        }
    }
}

/// Key of the use map: source plus expected digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineReference {
    pub source: PipelineSource,
    pub digest: String,
}

impl PipelineReference {
    pub fn from_spec(spec: &PipelineSpec) -> Self {
        let git_release = spec.git_release.as_ref().map(crate::crd::GitReleaseSpec::info);
        Self {
            source: PipelineSource::resolve(
                spec.https.as_ref().map(|h| h.url.as_str()),
                git_release.as_ref(),
            ),
            digest: spec.sha256.clone(),
        }
    }

    pub fn from_status(status: &PipelineStatus) -> Self {
        Self {
            source: PipelineSource::resolve(status.url.as_deref(), status.git_release.as_ref()),
            digest: status.digest.clone(),
        }
    }

    /// First 8 characters of the digest, used to name rendered assets
    pub fn short_digest(&self) -> String {
        short_digest(&self.digest)
    }
}

pub fn short_digest(digest: &str) -> String {
    if digest.len() >= 8 && digest.is_char_boundary(8) {
        digest[..8].to_string()
    } else {
        "nodigest".to_string()
    }
}

impl fmt::Display for PipelineReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.digest)
    }
}
