//! # Pipeline Assets
//!
//! Fetching, verification, decoding and reference-counted activation of
//! pipeline archives.
//!
//! ## Sub-modules
//!
//! - `source` - Archive identity (source + digest) and file type
//! - `http_cache` - Archive transport with conditional GET cache
//! - `fetch` - Digest verification and dispatch to the decoder
//! - `manifest` - `manifest.yaml` index validation and YAML decoding
//! - `render` - Activation directive rendering
//! - `usage` - Use counts per archive
//! - `store` - Cluster object store
//! - `assets` - Per-object create, adopt and delete
//! - `activate` - The activation pass

pub mod activate;
pub mod assets;
pub mod error;
pub mod fetch;
pub mod http_cache;
pub mod manifest;
pub mod render;
pub mod source;
pub mod store;
pub mod usage;

pub use activate::{activate_pipelines, ActivationContext, MANIFESTS_UNAVAILABLE_MESSAGE};
pub use assets::{annotation_owners, AssetOwner, GROUP_REJECTED_MESSAGE, OWNER_UIDS_ANNOTATION};
pub use error::PipelineError;
pub use fetch::get_manifests;
pub use http_cache::{ArchiveCache, ArchiveTransport, HttpArchiveTransport};
pub use manifest::{decode_archive, sha256_hex, StackAsset};
pub use render::{DirectiveRenderer, RenderContext, Renderer};
pub use source::{PipelineReference, PipelineSource};
pub use store::{KubeObjectStore, ObjectStore};
pub use usage::{PipelineUsage, PipelineUseMap};
