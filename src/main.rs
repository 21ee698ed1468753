//! Deployer - reconciles model serving deployments onto Kubernetes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use deployer_cluster::{Controller, DeploymentRequest, KubeClusterClient};
use deployer_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use deployer_common::DeploymentConfig;

/// Exit code when a deployment finished without becoming ready
const EXIT_NOT_READY: i32 = 2;

/// Deployer - create, update and inspect model serving deployments
#[derive(Parser, Debug)]
#[command(name = "deployer", version, about, long_about = None)]
struct Cli {
    /// Environment configuration (YAML); built-in defaults when omitted
    #[arg(long, env = "DEPLOYER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Kubeconfig to use instead of in-cluster or default discovery
    #[arg(long, env = "KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Log line format (json or text)
    #[arg(long, env = "DEPLOYER_LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy a model version and wait for a terminal outcome
    ///
    /// Prints the outcome as JSON. Exits non-zero when the deployment
    /// failed or did not become ready in time.
    Deploy(RequestArgs),

    /// Delete the serving resource of a model version
    Undeploy(RequestArgs),

    /// Interpret the current status of a serving resource once
    Status(ResourceArgs),

    /// List pods matching a label selector
    Pods(SelectorArgs),

    /// List containers (including init containers) of matching pods
    Containers(SelectorArgs),
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Path to the deployment request (YAML)
    #[arg(short = 'f', long = "file")]
    file: PathBuf,
}

#[derive(Args, Debug)]
struct ResourceArgs {
    /// Namespace of the serving resource
    #[arg(short, long)]
    namespace: String,

    /// Name of the serving resource
    #[arg(long)]
    name: String,
}

#[derive(Args, Debug)]
struct SelectorArgs {
    /// Namespace to list in
    #[arg(short, long)]
    namespace: String,

    /// Label selector (e.g., "deployer.io/model=fraud,deployer.io/version=3")
    #[arg(short = 'l', long)]
    selector: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install TLS crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        filter: None,
    })?;

    let config = match &cli.config {
        Some(path) => DeploymentConfig::load(path)?,
        None => DeploymentConfig::default(),
    };

    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let cluster_client = Arc::new(KubeClusterClient::new(client, config.field_manager.clone()));
    let controller = Controller::new(cluster_client, config)?;

    match cli.command {
        Commands::Deploy(args) => run_deploy(&controller, &args.file).await,
        Commands::Undeploy(args) => {
            let request = read_request(&args.file).await?;
            let deleted = controller.undeploy(&request).await?;
            print_json(&serde_json::json!({ "deleted": deleted }))
        }
        Commands::Status(args) => {
            let outcome = controller.status(&args.namespace, &args.name).await?;
            print_json(&outcome)
        }
        Commands::Pods(args) => {
            let snapshot = controller.list_pods(&args.namespace, &args.selector).await?;
            print_json(&snapshot)
        }
        Commands::Containers(args) => {
            let containers = controller
                .get_containers(&args.namespace, &args.selector)
                .await?;
            print_json(&containers)
        }
    }
}

/// Deploy, cancelling the in-flight wait on Ctrl-C
async fn run_deploy(controller: &Controller, file: &Path) -> anyhow::Result<()> {
    let request = read_request(file).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling deployment wait");
            on_signal.cancel();
        }
    });

    let outcome = controller.deploy_with_cancel(&request, cancel).await?;
    info!(outcome = %outcome, "deployment finished");
    print_json(&outcome)?;

    if !outcome.is_ready() {
        std::process::exit(EXIT_NOT_READY);
    }
    Ok(())
}

async fn read_request(path: &Path) -> anyhow::Result<DeploymentRequest> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read request file {:?}: {}", path, e))?;
    serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse deployment request: {}", e))
}

/// Build a kube client from an explicit kubeconfig or the default chain
async fn create_client(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => Config::infer().await?,
    };
    Ok(Client::try_from(config)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
