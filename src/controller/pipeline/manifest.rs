//! # Manifest Decoding
//!
//! Unpacks pipeline archives into [`StackAsset`]s.
//!
//! A `.tar.gz` archive carries a `manifest.yaml` index listing every YAML file
//! and its SHA-256. The archive is streamed twice from the same buffer: the
//! first pass only locates and parses the index, the second verifies each file
//! against it and decodes the documents.

use super::error::PipelineError;
use super::render::{RenderContext, Renderer};
use flate2::read::GzDecoder;
use kube::core::{DynamicObject, GroupVersionKind};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use tracing::{debug, info};

pub const MANIFEST_INDEX: &str = "manifest.yaml";

/// One decoded object from a pipeline archive
#[derive(Debug, Clone)]
pub struct StackAsset {
    pub name: String,
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Checksum of the file the object came from
    pub sha256: String,
    pub object: DynamicObject,
}

impl StackAsset {
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ManifestIndex {
    #[serde(default)]
    contents: Vec<IndexEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexEntry {
    #[serde(default)]
    file: String,
    #[serde(default)]
    sha256: String,
}

impl ManifestIndex {
    fn lookup(&self, file: &str) -> Option<&IndexEntry> {
        self.contents
            .iter()
            .find(|entry| entry.file.trim_start_matches("./") == file)
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn normalize_entry_name(name: &str) -> &str {
    name.strip_prefix("./").unwrap_or(name)
}

/// Reads exactly the declared size of an entry
///
/// The buffer grows with the bytes actually present; the header size is only
/// an upper bound.
fn read_entry<R: Read>(entry: &mut tar::Entry<'_, R>, name: &str) -> Result<Vec<u8>, PipelineError> {
    let declared = entry.header().size()?;
    let mut buf = Vec::new();
    match entry.by_ref().take(declared).read_to_end(&mut buf) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(PipelineError::TruncatedArchive(name.to_string()));
        }
        Err(e) => return Err(e.into()),
    }
    if (buf.len() as u64) < declared {
        return Err(PipelineError::TruncatedArchive(name.to_string()));
    }
    Ok(buf)
}

fn map_entry_error(err: std::io::Error, name: &str) -> PipelineError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        PipelineError::TruncatedArchive(name.to_string())
    } else {
        PipelineError::Archive(err)
    }
}

fn read_index(archive: &[u8]) -> Result<ManifestIndex, PipelineError> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let mut index = None;
    let mut seen = Vec::new();

    for entry in tar.entries().map_err(|e| map_entry_error(e, "<archive>"))? {
        let mut entry = entry.map_err(|e| map_entry_error(e, "<archive>"))?;
        let name = entry.path()?.to_string_lossy().into_owned();
        // Every entry is read in full so truncation surfaces here
        let bytes = read_entry(&mut entry, &name)?;
        seen.push(name.clone());

        if normalize_entry_name(&name) == MANIFEST_INDEX {
            let parsed: ManifestIndex = if bytes.iter().all(u8::is_ascii_whitespace) {
                ManifestIndex::default()
            } else {
                serde_yaml::from_slice(&bytes).map_err(PipelineError::IndexParse)?
            };
            index = Some(parsed);
        }
    }

    debug!("Archive entries: {}", seen.join(","));
    index.ok_or(PipelineError::ManifestMissing)
}

/// Decode a `.tar.gz` pipeline archive
pub fn decode_archive(
    archive: &[u8],
    context: &RenderContext,
    renderer: &dyn Renderer,
) -> Result<Vec<StackAsset>, PipelineError> {
    let index = read_index(archive)?;

    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let mut assets = Vec::new();

    for entry in tar.entries().map_err(|e| map_entry_error(e, "<archive>"))? {
        let mut entry = entry.map_err(|e| map_entry_error(e, "<archive>"))?;
        let raw_name = entry.path()?.to_string_lossy().into_owned();
        let name = normalize_entry_name(&raw_name).to_string();

        if name == MANIFEST_INDEX || !name.ends_with(".yaml") {
            continue;
        }

        let bytes = read_entry(&mut entry, &raw_name)?;
        let actual = sha256_hex(&bytes);

        let indexed = index
            .lookup(&name)
            .ok_or_else(|| PipelineError::UnindexedAsset(raw_name.clone()))?;

        if indexed.sha256.is_empty() {
            info!(
                "Archive file {} was listed in the manifest but had no checksum. Checksum validation for this file is skipped.",
                raw_name
            );
        } else if !indexed.sha256.eq_ignore_ascii_case(&actual) {
            return Err(PipelineError::ChecksumMismatch {
                file: raw_name,
                expected: indexed.sha256.clone(),
                actual,
            });
        }

        assets.extend(decode_documents(&bytes, context, renderer, &raw_name, &indexed.sha256)?);
    }

    Ok(assets)
}

/// Render a single YAML file and split it into assets
pub fn decode_documents(
    bytes: &[u8],
    context: &RenderContext,
    renderer: &dyn Renderer,
    file: &str,
    sha256: &str,
) -> Result<Vec<StackAsset>, PipelineError> {
    let rendered = renderer.render(bytes, context).map_err(|e| match e {
        PipelineError::Render { message, .. } => PipelineError::Render {
            file: file.to_string(),
            message,
        },
        other => other,
    })?;

    let mut assets = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(&rendered) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| PipelineError::Decode {
            file: file.to_string(),
            message: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }
        assets.push(to_asset(value, file, sha256)?);
    }
    Ok(assets)
}

fn to_asset(value: serde_yaml::Value, file: &str, sha256: &str) -> Result<StackAsset, PipelineError> {
    let decode_err = |message: String| PipelineError::Decode {
        file: file.to_string(),
        message,
    };

    let json = serde_json::to_value(&value).map_err(|e| decode_err(e.to_string()))?;
    let object: DynamicObject =
        serde_json::from_value(json).map_err(|e| decode_err(e.to_string()))?;

    let types = object
        .types
        .clone()
        .ok_or_else(|| decode_err("document has no apiVersion/kind".to_string()))?;
    if types.kind.is_empty() {
        return Err(decode_err("document has no kind".to_string()));
    }
    let (group, version) = split_api_version(&types.api_version);

    Ok(StackAsset {
        name: object.metadata.name.clone().unwrap_or_default(),
        group,
        version,
        kind: types.kind,
        sha256: sha256.to_string(),
        object,
    })
}

/// `tekton.dev/v1alpha1` → (`tekton.dev`, `v1alpha1`); `v1` → (``, `v1`)
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}
