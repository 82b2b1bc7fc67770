//! # Pipeline Errors
//!
//! Error taxonomy for fetching, verifying and decoding pipeline archives.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither a URL nor complete git release coordinates were provided
    #[error("no pipeline source: neither an https url nor git release information was provided")]
    NoSource,

    #[error("{0:#}")]
    Transport(anyhow::Error),

    #[error("Must be .tar.gz or .yaml: {0}")]
    UnsupportedFileType(String),

    #[error("the digest of {location} ({actual}) does not match the expected digest {expected}")]
    DigestMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("unable to read manifest.yaml: not found in archive")]
    ManifestMissing,

    #[error("File {0} was found in the archive, but not in the manifest.yaml")]
    UnindexedAsset(String),

    #[error("the checksum of {file} ({actual}) does not match the manifest.yaml checksum {expected}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("archive entry {0} ended before its declared size")]
    TruncatedArchive(String),

    #[error("unable to read archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error("unable to parse manifest.yaml: {0}")]
    IndexParse(#[source] serde_yaml::Error),

    #[error("unable to render {file}: {message}")]
    Render { file: String, message: String },

    #[error("unable to decode {file}: {message}")]
    Decode { file: String, message: String },

    /// Structural bookkeeping failure, aborts the whole pass
    #[error("Pipeline version not found in use map: {0}")]
    UseCountInconsistent(String),
}

impl PipelineError {
    /// Errors that indicate a logic defect rather than an external failure
    pub fn is_structural(&self) -> bool {
        matches!(self, PipelineError::UseCountInconsistent(_))
    }
}
