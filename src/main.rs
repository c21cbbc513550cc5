//! sidecar-operator - tracks which workloads each SidecarWorkload selects

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sidecar_operator::config::ControllerConfig;
use sidecar_operator::controller::{error_policy, reconcile};
use sidecar_operator::crd::SidecarWorkload;
use sidecar_operator::store::KubeStore;

/// sidecar-operator - Kubernetes controller for SidecarWorkload resources
#[derive(Parser, Debug)]
#[command(name = "sidecar-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    Controller(ControllerConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&SidecarWorkload::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = match cli.command {
        Some(Commands::Controller(config)) => config,
        None => ControllerConfig::parse_from(["sidecar-operator"]),
    };
    run_controller(config).await
}

/// Install or update the SidecarWorkload CRD with server-side apply
async fn ensure_crd_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    tracing::info!("Installing SidecarWorkload CRD...");
    crds.patch(
        "sidecarworkloads.sidecar.dev",
        &params,
        &Patch::Apply(&SidecarWorkload::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install SidecarWorkload CRD: {}", e))?;

    Ok(())
}

/// Run the SidecarWorkload controller until a shutdown signal arrives
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    tracing::info!(?config, "sidecar-operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !config.skip_crd_install {
        ensure_crd_installed(&client, &config.field_manager).await?;
    }

    let store = Arc::new(KubeStore::new(client.clone(), config.field_manager.clone()));
    let ctx = Arc::new(config.context(store));

    let resources: Api<SidecarWorkload> = match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    tracing::info!(namespace = ?config.namespace, "Starting SidecarWorkload controller");

    Controller::new(resources, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(resource = %obj.name, ?action, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("sidecar-operator stopped");
    Ok(())
}
