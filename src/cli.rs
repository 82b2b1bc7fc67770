//! # STACKCTL CLI
//!
//! Command-line interface for the Stack controller.
//!
//! ## Usage
//!
//! ```bash
//! # Trigger reconciliation for a specific Stack
//! stackctl reconcile --namespace kabanero --name java-microprofile
//!
//! # List all Stack resources
//! stackctl list
//!
//! # Show versions, pipelines and assets of a Stack
//! stackctl status --namespace kabanero --name java-microprofile
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use stack_controller::crd::{AssetState, Stack};

/// Annotation bumped to force a reconcile
const RECONCILE_ANNOTATION: &str = "kabanero.io/reconcile";

/// Stack Controller CLI
#[derive(Parser)]
#[command(name = "stackctl")]
#[command(about = "Stack Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger reconciliation for a Stack resource
    Reconcile {
        /// Name of the Stack resource
        #[arg(long)]
        name: String,
    },
    /// List Stack resources (all namespaces unless --namespace is given)
    List,
    /// Show status of a Stack resource
    Status {
        /// Name of the Stack resource
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Reconcile { name } => reconcile_command(client, name, cli.namespace).await,
        Commands::List => list_command(client, cli.namespace).await,
        Commands::Status { name } => status_command(client, name, cli.namespace).await,
    }
}

/// Trigger reconciliation by updating an annotation the controller watches
async fn reconcile_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    println!("Triggering reconciliation for Stack '{}/{}'...", ns, name);

    let api: Api<Stack> = Api::namespaced(client, ns);
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let patch = json!({
        "metadata": {
            "annotations": {
                RECONCILE_ANNOTATION: timestamp
            }
        }
    });

    api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for '{}/{}'", ns, name))?;

    println!("Reconciliation triggered");
    println!("   Resource: {}/{}", ns, name);
    println!("   Timestamp: {}", timestamp);
    Ok(())
}

async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<Stack> = match namespace {
        Some(ns) => Api::namespaced(client, &ns),
        None => Api::all(client),
    };

    let stacks = api
        .list(&ListParams::default())
        .await
        .context("Failed to list Stack resources")?;

    if stacks.items.is_empty() {
        println!("No Stack resources found.");
        return Ok(());
    }

    println!("{:<30} {:<20} {:<10} SUMMARY", "NAME", "NAMESPACE", "VERSIONS");
    println!("{}", "-".repeat(90));
    for stack in stacks.items {
        let summary = stack
            .status
            .as_ref()
            .and_then(|s| s.summary.clone())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<30} {:<20} {:<10} {}",
            stack.name_any(),
            stack.namespace().unwrap_or_default(),
            stack.spec.versions.len(),
            summary
        );
    }
    Ok(())
}

async fn status_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<Stack> = Api::namespaced(client, ns);
    let stack = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get Stack '{}/{}'", ns, name))?;

    println!("Stack {}/{} ({})", ns, name, stack.spec.name);
    for version in &stack.spec.versions {
        println!(
            "  spec {} [{}]: {} pipelines",
            version.version,
            version.desired_state,
            version.pipelines.len()
        );
    }

    let Some(status) = stack.status.as_ref() else {
        println!("\nStatus: No status available (resource may not have been reconciled yet)");
        return Ok(());
    };

    println!("\nStatus: {}", status.summary.as_deref().unwrap_or("-"));
    for version in &status.versions {
        let state = version
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} [{}]", version.version, state);
        if let Some(message) = &version.status_message {
            println!("    {}", message);
        }
        for pipeline in &version.pipelines {
            println!("    pipeline {} digest {}", pipeline.name, pipeline.digest);
            for asset in &pipeline.active_assets {
                let marker = match asset.status {
                    AssetState::Active => "ok",
                    AssetState::Failed => "FAILED",
                    AssetState::Unknown => "?",
                };
                println!(
                    "      [{}] {}/{} {}/{}",
                    marker, asset.namespace, asset.name, asset.group, asset.kind
                );
                if let Some(message) = &asset.status_message {
                    println!("          {}", message);
                }
            }
        }
    }
    Ok(())
}
