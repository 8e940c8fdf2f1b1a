use clap::{Args, Parser, Subcommand};
use eks_node_readiness::autoscaling::groups::ScalingGroups;
use eks_node_readiness::aws::{AmbientCredentials, CredentialSource};
use eks_node_readiness::clock::{Clock, TokioClock};
use eks_node_readiness::config::{self, load_config, load_node_groups};
use eks_node_readiness::eks::clusters::Clusters;
use eks_node_readiness::eks::token::TokenGenerator;
use eks_node_readiness::node_groups::{
    await_all, AwaitedGroup, KubernetesContext, KubernetesNodeCounter, ReadinessController,
    ReadinessPolicy, ReadinessResult, ReadyNodeCounter, RunMode, ScalingGroupRef,
};
use eks_node_readiness::{autoscaling, eks, AppConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::subscriber::set_global_default;
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Parser, Debug)]
#[command(version, about = "Waits for EKS node groups to become ready")]
struct Cli {
    /// Path of the config file, falls back to APP_CONFIG and then config.yml
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for every node group configured with await=true and print a readiness report
    Wait(WaitArgs),
    /// Print an ExecCredential for the cluster, usable as a kubeconfig exec plugin
    Token(TokenArgs),
}

#[derive(Args, Debug, Default)]
struct WaitArgs {
    /// Report without calling any AWS or Kubernetes API
    #[arg(long)]
    dry_run: bool,
    /// Restrict the wait to these node groups
    #[arg(long = "group")]
    groups: Vec<String>,
}

#[derive(Args, Debug)]
struct TokenArgs {
    #[arg(long)]
    cluster_name: Option<String>,
    #[arg(long)]
    region: Option<String>,
}

#[derive(Serialize, Debug)]
struct Report<'a> {
    ready: bool,
    node_groups: BTreeMap<&'a str, &'a ReadinessResult>,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer);

    set_global_default(subscriber)?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging().map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Command::Token(args)) => token(config, args).await,
        Some(Command::Wait(args)) => wait(config, args).await,
        None => wait(config, WaitArgs::default()).await,
    }
}

async fn token(config: AppConfig, args: TokenArgs) -> anyhow::Result<()> {
    let cluster_name = args
        .cluster_name
        .unwrap_or_else(|| config.cluster.name.clone());
    let region = args.region.unwrap_or_else(|| config.cluster.region());

    let credentials = Arc::new(AmbientCredentials::load(&region).await);
    let token = TokenGenerator::new(credentials)
        .generate(&cluster_name, &region)
        .await?;

    println!(
        "{}",
        serde_json::to_string(&token.to_exec_credential())?
    );

    Ok(())
}

async fn wait(config: AppConfig, args: WaitArgs) -> anyhow::Result<()> {
    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Apply
    };
    let region = config.cluster.region();
    let node_groups: BTreeMap<String, config::NodeGroup> = load_node_groups(&config.node_groups_path)?
        .into_iter()
        .filter(|(name, _)| args.groups.is_empty() || args.groups.contains(name))
        .collect();
    info!(cluster = %config.cluster.name, %region, %mode, node_groups = node_groups.len(), "Loaded node groups");

    let credentials: Arc<dyn CredentialSource> = Arc::new(AmbientCredentials::load(&region).await);
    let connection = if mode == RunMode::Apply && node_groups.values().any(|ng| ng.await_ready) {
        cluster_connection(&config.cluster, &region, Arc::clone(&credentials)).await
    } else {
        None
    };

    let mut scaling_groups = autoscaling::Client::builder()
        .region(region.clone())
        .credentials(Arc::clone(&credentials));
    if let Some(address) = &config.cluster.autoscaling_address {
        scaling_groups = scaling_groups.address(address.clone());
    }
    let scaling_groups: Arc<dyn ScalingGroups> = Arc::new(scaling_groups.build()?);
    let nodes: Arc<dyn ReadyNodeCounter> = Arc::new(KubernetesNodeCounter::new(
        TokenGenerator::new(Arc::clone(&credentials)),
        config.readiness.kubernetes_request_timeout,
    ));
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

    let mut groups = Vec::with_capacity(node_groups.len());
    for (name, node_group) in &node_groups {
        if !node_group.availability_zones.is_empty() {
            warn!(
                node_group = %name,
                availability_zones = ?node_group.availability_zones,
                "availability_zones is not applied to readiness checks"
            );
        }

        let kubernetes = connection
            .as_ref()
            .map(|(endpoint, ca_data)| KubernetesContext {
                cluster_name: config.cluster.name.clone(),
                cluster_endpoint: endpoint.clone(),
                cluster_ca_data: ca_data.clone(),
                node_group_label: node_group.node_label(name),
            });
        let policy = ReadinessPolicy::from_config(node_group, &config.readiness, kubernetes)?;

        groups.push(AwaitedGroup {
            name: name.clone(),
            await_ready: node_group.await_ready,
            controller: ReadinessController::new(
                ScalingGroupRef {
                    name: node_group.asg_name(&config.cluster.name, name),
                    region: region.clone(),
                },
                policy,
                mode,
                Arc::clone(&scaling_groups),
                Arc::clone(&nodes),
                Arc::clone(&clock),
            ),
        });
    }

    let ready = match await_all(&groups, mode).await {
        Ok(ready) => ready,
        Err(e) => {
            error!(error = %e, span_trace = %e.span_trace(), "Node group readiness wait failed");
            return Err(e.into());
        }
    };

    let mut report = Report {
        ready,
        node_groups: BTreeMap::new(),
    };
    for group in groups.iter().filter(|g| g.await_ready) {
        let details = group.controller.details().await?;
        report.node_groups.insert(group.name.as_str(), details);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Cluster endpoint and CA data from the config, discovered through EKS when either is missing.
async fn cluster_connection(
    cluster: &config::Cluster,
    region: &str,
    credentials: Arc<dyn CredentialSource>,
) -> Option<(String, String)> {
    if let (Some(endpoint), Some(ca_data)) = (&cluster.endpoint, &cluster.certificate_authority_data)
    {
        return Some((endpoint.clone(), ca_data.clone()));
    }

    let mut client = eks::Client::builder()
        .region(region.to_owned())
        .credentials(credentials);
    if let Some(address) = &cluster.eks_address {
        client = client.address(address.clone());
    }

    let discovered = match client.build() {
        Ok(client) => client.describe_cluster(&cluster.name).await,
        Err(e) => Err(e),
    };

    match discovered {
        Ok(discovered) => {
            let endpoint = cluster.endpoint.clone().or(discovered.endpoint.clone());
            let ca_data = cluster
                .certificate_authority_data
                .clone()
                .or_else(|| discovered.ca_data().map(String::from));
            info!(cluster = %cluster.name, status = ?discovered.status, "Discovered cluster connection details");

            endpoint.zip(ca_data)
        }
        Err(e) => {
            warn!(
                cluster = %cluster.name,
                error = %e,
                "Failed to discover cluster connection details, Kubernetes node checks will be skipped"
            );
            None
        }
    }
}
