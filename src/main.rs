//! Shared-service operator - provisions shared backing services and tenant slices

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};

use shared_service_operator::config::OperatorConfig;
use shared_service_operator::controller::Context;
use shared_service_operator::crd::{SharedService, SharedServiceClient, SharedServiceSlice};
use shared_service_operator::telemetry::{init_tracing, LogFormat};
use shared_service_operator::watch::{dispatch, KubeEventSource};
use shared_service_operator::{DEFAULT_SLICE_CAPACITY, OPERATOR_NAME};

/// Shared-service operator - carves shared backing services into tenant slices
#[derive(Parser, Debug)]
#[command(
    name = "shared-service-operator",
    version,
    about,
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Controller arguments used when no subcommand is given
    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    ///
    /// Installs the CRDs, then watches SharedServices, slices and clients in
    /// one namespace until interrupted.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Args, Debug, Clone)]
struct ControllerArgs {
    /// Namespace to watch and provision into
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Shared instance handed to every slice, bypassing capacity accounting
    ///
    /// Bootstrap/testing shortcut; leave unset in production.
    #[arg(long = "shared-instance", env = "SSI")]
    shared_instance: Option<String>,

    /// Slice capacity for shared services that don't declare one
    #[arg(long, env = "DEFAULT_SLICE_CAPACITY", default_value_t = DEFAULT_SLICE_CAPACITY)]
    default_capacity: u32,

    /// Seconds between re-deliveries of every cached resource
    #[arg(long, env = "RESYNC_PERIOD_SECS", default_value = "5")]
    resync_secs: u64,

    /// Deadline in seconds for each Kubernetes API call
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value = "30")]
    call_timeout_secs: u64,

    /// Upper bound on reconciles running at once
    #[arg(long, default_value = "16")]
    max_concurrent_reconciles: usize,
}

impl ControllerArgs {
    fn into_config(self) -> OperatorConfig {
        OperatorConfig {
            namespace: self.namespace,
            fallback_shared_instance: None,
            default_capacity: self.default_capacity.max(1),
            call_timeout: Duration::from_secs(self.call_timeout_secs.max(1)),
            resync_period: Duration::from_secs(self.resync_secs.max(1)),
            max_concurrent_reconciles: self.max_concurrent_reconciles.max(1),
        }
        .with_fallback_shared_instance(self.shared_instance)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [SharedService::crd(), SharedServiceSlice::crd(), SharedServiceClient::crd()] {
            let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD")?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_tracing(cli.log_format).context("Failed to initialize logging")?;

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(cli.controller).await,
    }
}

/// Install or update the operator's CRDs with server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(OPERATOR_NAME).force();

    for crd in [SharedService::crd(), SharedServiceSlice::crd(), SharedServiceClient::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .with_context(|| format!("Failed to install CRD {}", name))?;
    }

    tracing::info!("All CRDs installed/updated");
    Ok(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let config = args.into_config();
    tracing::info!(
        namespace = %config.namespace,
        shared_instance_override = config.fallback_shared_instance.is_some(),
        "Shared-service operator starting"
    );
    if let Some(instance) = &config.fallback_shared_instance {
        tracing::warn!(instance = %instance, "Every slice is allocated onto the shared instance override");
    }

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    ensure_crds_installed(&client).await?;

    let ctx = Arc::new(Context::builder(client.clone(), &config).build());
    let source = KubeEventSource::new(client, config.namespace.clone(), config.resync_period);

    tokio::select! {
        _ = dispatch(&source, ctx, config.max_concurrent_reconciles) => {
            tracing::info!("Watch streams ended");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shared-service operator shutting down");
    Ok(())
}
