//! Stratus operator - multi-cluster integration health control plane

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use stratus_common::crd::{Integration, TargetCluster};
use stratus_common::{telemetry, FIELD_MANAGER};
use stratus_operator::controller::integration::Context;
use stratus_operator::controller::target::TargetContext;
use stratus_operator::controller_runner::{build_integration_controller, build_target_controller};
use stratus_operator::registry::health::HealthMonitor;
use stratus_operator::registry::ClusterRegistry;
use stratus_operator::{
    DEFAULT_HEALTH_INTERVAL_SECS, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_STALE_MAX_AGE_SECS,
};

/// Stratus - deploys and continuously verifies third-party operational
/// tooling across a fleet of Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "stratus", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator (default mode)
    Run {
        /// Seconds between background health-monitor rounds
        #[arg(long, default_value_t = DEFAULT_HEALTH_INTERVAL_SECS)]
        health_interval_secs: u64,

        /// Per-cluster probe timeout in seconds
        #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
        probe_timeout_secs: u64,

        /// Evict registry entries not seen for this many seconds
        #[arg(long, default_value_t = DEFAULT_STALE_MAX_AGE_SECS)]
        stale_max_age_secs: u64,

        /// Disable the background health monitor (probes still run
        /// on-demand during reconciliation)
        #[arg(long)]
        disable_health_monitor: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        // Print CRD YAML for both resources; no telemetry, no client
        print!("{}", serde_yaml::to_string(&Integration::crd())?);
        println!("---");
        print!("{}", serde_yaml::to_string(&TargetCluster::crd())?);
        return Ok(());
    }

    telemetry::init("stratus-operator")
        .map_err(|e| anyhow::anyhow!("telemetry initialization failed: {e}"))?;

    match cli.command {
        Some(Commands::Run {
            health_interval_secs,
            probe_timeout_secs,
            stale_max_age_secs,
            disable_health_monitor,
        }) => {
            run(
                Duration::from_secs(health_interval_secs),
                Duration::from_secs(probe_timeout_secs),
                Duration::from_secs(stale_max_age_secs),
                disable_health_monitor,
            )
            .await
        }
        None => {
            run(
                Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS),
                Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
                Duration::from_secs(DEFAULT_STALE_MAX_AGE_SECS),
                false,
            )
            .await
        }
    }
}

/// Ensure the Stratus CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply
/// so the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Api, Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing Integration CRD...");
    crds.patch(
        "integrations.stratus.dev",
        &params,
        &Patch::Apply(&Integration::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to install Integration CRD: {e}"))?;

    tracing::info!("Installing TargetCluster CRD...");
    crds.patch(
        "targetclusters.stratus.dev",
        &params,
        &Patch::Apply(&TargetCluster::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to install TargetCluster CRD: {e}"))?;

    tracing::info!("All Stratus CRDs installed/updated");
    Ok(())
}

async fn run(
    health_interval: Duration,
    probe_timeout: Duration,
    stale_max_age: Duration,
    disable_health_monitor: bool,
) -> anyhow::Result<()> {
    // Failing to reach our own control plane is unrecoverable: exit
    // non-zero so a supervisor restarts us instead of running blind
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("cannot build control-plane client: {e}"))?;
    let version = client
        .apiserver_version()
        .await
        .map_err(|e| anyhow::anyhow!("cannot reach control-plane API: {e}"))?;
    tracing::info!(version = %version.git_version, "connected to control plane");

    ensure_crds_installed(&client).await?;

    let registry = Arc::new(ClusterRegistry::new());
    let monitor = Arc::new(
        HealthMonitor::new(registry.clone()).with_probe_timeout(probe_timeout),
    );

    let mut integration_ctx = Context::new(client.clone(), registry.clone());
    integration_ctx.probe_timeout = probe_timeout;
    let target_ctx = TargetContext::new(client.clone(), registry, monitor.clone());

    let monitor_task = if disable_health_monitor {
        tracing::warn!("background health monitor disabled");
        None
    } else {
        let monitor = monitor.clone();
        Some(tokio::spawn(async move {
            monitor.run(health_interval, stale_max_age).await;
        }))
    };

    tracing::info!("Starting controllers:");
    let controllers = vec![
        build_integration_controller(client.clone(), Arc::new(integration_ctx)),
        build_target_controller(client, Arc::new(target_ctx)),
    ];

    // Controllers run until the shutdown signal; the monitor task is
    // torn down with the process
    futures::future::join_all(controllers).await;

    if let Some(task) = monitor_task {
        task.abort();
    }
    tracing::info!("shutdown complete");
    Ok(())
}
