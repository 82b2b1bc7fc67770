//! # Archive Fetching
//!
//! Retrieves a pipeline archive, verifies its digest and hands it to the
//! manifest decoder.

use super::error::PipelineError;
use super::http_cache::ArchiveTransport;
use super::manifest::{decode_archive, decode_documents, sha256_hex, StackAsset};
use super::render::{RenderContext, Renderer};
use super::source::{FileType, PipelineReference, PipelineSource};
use crate::observability;
use std::time::Instant;
use tracing::{info_span, warn, Instrument};

/// Raw bytes of the archive behind `reference`
pub async fn fetch_archive(
    transport: &dyn ArchiveTransport,
    reference: &PipelineReference,
    skip_cert_verify: bool,
) -> Result<Vec<u8>, PipelineError> {
    let result = match &reference.source {
        PipelineSource::GitRelease(info) => {
            transport.fetch_from_git_release(info, skip_cert_verify).await
        }
        PipelineSource::Https { url } if !url.is_empty() => {
            transport.fetch(url, skip_cert_verify).await
        }
        PipelineSource::Https { .. } => return Err(PipelineError::NoSource),
    };
    result.map_err(PipelineError::Transport)
}

/// Fetch, verify and decode the assets of one pipeline
///
/// A digest mismatch on a `.tar.gz` archive is fatal. A `.yaml` file with a
/// mismatching digest is logged and decoded anyway.
pub async fn get_manifests(
    transport: &dyn ArchiveTransport,
    renderer: &dyn Renderer,
    reference: &PipelineReference,
    name: &str,
    context: &RenderContext,
    skip_cert_verify: bool,
) -> Result<Vec<StackAsset>, PipelineError> {
    let span = info_span!(
        "pipeline.get_manifests",
        pipeline.name = name,
        pipeline.source = %reference.source,
        operation.success = tracing::field::Empty,
        operation.duration_ms = tracing::field::Empty,
    );
    let span_clone = span.clone();
    let start = Instant::now();

    async move {
        observability::metrics::increment_archive_fetches();
        let result = fetch_and_decode(transport, renderer, reference, name, context, skip_cert_verify).await;

        observability::metrics::observe_archive_fetch_duration(start.elapsed().as_secs_f64());
        span_clone.record("operation.duration_ms", start.elapsed().as_millis() as u64);
        span_clone.record("operation.success", result.is_ok());
        if result.is_err() {
            observability::metrics::increment_archive_fetch_errors();
        }
        result
    }
    .instrument(span)
    .await
}

async fn fetch_and_decode(
    transport: &dyn ArchiveTransport,
    renderer: &dyn Renderer,
    reference: &PipelineReference,
    name: &str,
    context: &RenderContext,
    skip_cert_verify: bool,
) -> Result<Vec<StackAsset>, PipelineError> {
    if reference.source.url().is_some_and(str::is_empty) {
        return Err(PipelineError::NoSource);
    }
    // Unsupported locations never reach the network
    let file_type = reference.source.file_type()?;
    let bytes = fetch_archive(transport, reference, skip_cert_verify).await?;
    let actual = sha256_hex(&bytes);
    let matches = actual.eq_ignore_ascii_case(&reference.digest);

    match file_type {
        FileType::TarGz => {
            if !matches {
                return Err(PipelineError::DigestMismatch {
                    location: reference.source.to_string(),
                    expected: reference.digest.clone(),
                    actual,
                });
            }
            decode_archive(&bytes, context, renderer)
        }
        FileType::Yaml => {
            if !matches {
                warn!(
                    "Index checksum {} does not match download checksum {} for pipeline {}",
                    reference.digest, actual, name
                );
            }
            decode_documents(&bytes, context, renderer, name, &actual)
        }
    }
}
