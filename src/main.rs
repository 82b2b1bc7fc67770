//! # Stack Controller
//!
//! A Kubernetes controller that activates the pipelines declared by `Stack`
//! resources.
//!
//! For every active stack version the controller downloads the referenced
//! pipeline archives, verifies them against their published digest and the
//! `manifest.yaml` checksum index, and creates the Tekton assets they contain
//! in the Stack's namespace. Assets shared by several versions or Stacks are
//! reference counted through owner references and removed once nothing uses
//! them.
//!
//! ## Features
//!
//! - **Verified archives**: `.tar.gz` and single-file `.yaml` pipelines over HTTPS or GitHub releases
//! - **Conditional downloads**: ETag/Date revalidation with an in-memory archive cache
//! - **Shared assets**: owner references across Stacks, deletion when the last owner goes
//! - **Prometheus metrics** and **health probes** on the metrics port

use anyhow::Result;
use stack_controller::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.stacks,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
