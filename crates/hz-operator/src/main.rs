//! Hazelcast Operator - converges data-structure configs and Jet jobs onto
//! Hazelcast clusters

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use kube::Client;

use hz_client::ClientRegistry;
use hz_common::crd::all_crds;
use hz_common::telemetry::init_logging;
use hz_common::ControllerConfig;
use hz_operator::controller_runner::{
    build_cluster_controller, build_data_structure_controllers, build_jet_controller,
    RunnerConfig,
};
use hz_operator::startup::ensure_crds_installed;
use hz_webhook::{start_server, KubeAdmissionStore, ServerConfig, WebhookState};

/// Hazelcast operator - CRD-driven config convergence for Hazelcast clusters
#[derive(Parser, Debug)]
#[command(name = "hazelcast-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers and the admission webhook (default mode)
    Controller,
}

#[derive(Args, Debug)]
struct ControllerArgs {
    /// Only watch resources in this namespace
    #[arg(long, env = "WATCH_NAMESPACE", global = true)]
    watch_namespace: Option<String>,

    /// Listen address of the admission webhook
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:9443", global = true)]
    webhook_addr: SocketAddr,

    /// Webhook serving certificate (PEM)
    #[arg(
        long,
        env = "WEBHOOK_TLS_CERT",
        default_value = "/tmp/k8s-webhook-server/serving-certs/tls.crt",
        global = true
    )]
    tls_cert: PathBuf,

    /// Webhook serving key (PEM)
    #[arg(
        long,
        env = "WEBHOOK_TLS_KEY",
        default_value = "/tmp/k8s-webhook-server/serving-certs/tls.key",
        global = true
    )]
    tls_key: PathBuf,

    /// Run without the admission webhook
    #[arg(long, env = "DISABLE_WEBHOOK", global = true)]
    disable_webhook: bool,

    /// Seconds to connect and authenticate to one member
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 10, global = true)]
    connect_timeout_secs: u64,

    /// Seconds allowed for each cluster call
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value_t = 10, global = true)]
    call_timeout_secs: u64,

    /// Seconds between persisted-config reads while a config is persisting
    #[arg(long, env = "PERSISTING_POLL_SECS", default_value_t = 1, global = true)]
    persisting_poll_secs: u64,

    /// Seconds before resubmitting after a transient failure
    #[arg(long, env = "SUBMIT_RETRY_SECS", default_value_t = 10, global = true)]
    submit_retry_secs: u64,

    /// Seconds to wait while a target cluster is not ready
    #[arg(long, env = "CLUSTER_NOT_READY_SECS", default_value_t = 30, global = true)]
    cluster_not_ready_secs: u64,

    /// Seconds between Jet job status polls
    #[arg(long, env = "JOB_POLL_SECS", default_value_t = 15, global = true)]
    job_poll_secs: u64,
}

impl ControllerArgs {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            persisting_poll: Duration::from_secs(self.persisting_poll_secs),
            submit_retry: Duration::from_secs(self.submit_retry_secs),
            cluster_not_ready: Duration::from_secs(self.cluster_not_ready_secs),
            job_poll: Duration::from_secs(self.job_poll_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The webhook and the kube client both need a process-wide provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The operator cannot serve or call TLS endpoints without it.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        for crd in all_crds() {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_logging()?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    }
}

/// Run every controller and the admission webhook until shutdown
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Hazelcast operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Operator installs its own CRDs on startup
    ensure_crds_installed(&client).await?;

    let runner = RunnerConfig {
        client: client.clone(),
        watch_namespace: args.watch_namespace.clone(),
        controller: args.controller_config(),
    };
    let registry = Arc::new(ClientRegistry::new());

    tracing::info!(namespace = ?runner.watch_namespace, "Starting Hazelcast controllers...");
    let mut controllers = build_cluster_controller(&runner, Arc::clone(&registry));
    controllers.extend(build_data_structure_controllers(&runner, Arc::clone(&registry)));
    controllers.extend(build_jet_controller(&runner, registry));

    if args.disable_webhook {
        tracing::warn!("Admission webhook disabled");
        join_all(controllers).await;
    } else {
        let server = ServerConfig {
            addr: args.webhook_addr,
            cert_pem: read_pem(&args.tls_cert).await?,
            key_pem: read_pem(&args.tls_key).await?,
        };
        let state = Arc::new(WebhookState::new(Arc::new(KubeAdmissionStore::new(client))));

        tokio::select! {
            _ = join_all(controllers) => {
                tracing::info!("Controllers completed");
            }
            result = start_server(server, state) => {
                result.map_err(|e| anyhow::anyhow!("Admission webhook failed: {}", e))?;
            }
        }
    }

    tracing::info!("Hazelcast operator shutting down");
    Ok(())
}

async fn read_pem(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_controller_config() {
        let cli = Cli::parse_from(["hazelcast-operator"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.controller.controller_config(), ControllerConfig::default());
    }

    #[test]
    fn flags_override_delays() {
        let cli = Cli::parse_from([
            "hazelcast-operator",
            "controller",
            "--watch-namespace",
            "data",
            "--job-poll-secs",
            "5",
        ]);
        assert!(matches!(cli.command, Some(Commands::Controller)));
        assert_eq!(cli.controller.watch_namespace.as_deref(), Some("data"));
        assert_eq!(
            cli.controller.controller_config().job_poll,
            Duration::from_secs(5)
        );
    }
}
