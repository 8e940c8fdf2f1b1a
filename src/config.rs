use crate::AppConfig;
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CLUSTER_NAME: &str = "infra-cluster";
pub const DEFAULT_REGION: &str = "eu-west-2";
pub const DEFAULT_READINESS_TIMEOUT_SECONDS: u64 = 900;
pub const DEFAULT_READINESS_POLL_INTERVAL_SECONDS: u64 = 15;

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub cluster: Cluster,
    #[serde(default)]
    pub readiness: Readiness,
    #[serde(default = "default_node_groups_path")]
    pub node_groups_path: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Cluster {
    #[serde(default = "default_cluster_name")]
    pub name: String,
    pub region: Option<String>,
    /// Discovered through EKS when either connection detail is missing.
    pub endpoint: Option<String>,
    pub certificate_authority_data: Option<String>,
    pub autoscaling_address: Option<String>,
    pub eks_address: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Readiness {
    #[serde(with = "humantime_serde", default = "default_kubernetes_timeout_cap")]
    pub kubernetes_timeout_cap: Duration,
    #[serde(
        with = "humantime_serde",
        default = "default_kubernetes_request_timeout"
    )]
    pub kubernetes_request_timeout: Duration,
}

#[derive(Deserialize, Debug, Default)]
pub struct NodeGroups {
    #[serde(default)]
    pub node_groups: BTreeMap<String, NodeGroup>,
}

/// Readiness related settings of a node group. Launch template settings living in the same
/// file are ignored.
#[derive(Deserialize, Debug, Clone)]
pub struct NodeGroup {
    #[serde(rename = "await", default)]
    pub await_ready: bool,
    #[serde(default = "default_readiness_timeout_seconds")]
    pub readiness_timeout_seconds: u64,
    #[serde(default = "default_readiness_poll_interval_seconds")]
    pub readiness_poll_interval_seconds: u64,
    pub asg_name: Option<String>,
    /// Value of the `NodeGroup` node label, defaults to the node group name.
    pub node_label: Option<String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            region: None,
            endpoint: None,
            certificate_authority_data: None,
            autoscaling_address: None,
            eks_address: None,
        }
    }
}

impl Cluster {
    pub fn region(&self) -> String {
        resolve_region(self.region.as_deref(), |key| std::env::var(key).ok())
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            kubernetes_timeout_cap: default_kubernetes_timeout_cap(),
            kubernetes_request_timeout: default_kubernetes_request_timeout(),
        }
    }
}

impl NodeGroup {
    pub fn asg_name(&self, cluster_name: &str, node_group_name: &str) -> String {
        self.asg_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", cluster_name, node_group_name))
    }

    pub fn node_label(&self, node_group_name: &str) -> String {
        self.node_label
            .clone()
            .unwrap_or_else(|| node_group_name.to_owned())
    }

    fn validate(&self, name: &str) -> anyhow::Result<()> {
        if self.readiness_timeout_seconds == 0 {
            anyhow::bail!("Node group {} has a readiness_timeout_seconds of 0", name);
        }
        if self.readiness_poll_interval_seconds == 0 {
            anyhow::bail!(
                "Node group {} has a readiness_poll_interval_seconds of 0",
                name
            );
        }

        Ok(())
    }
}

fn default_cluster_name() -> String {
    DEFAULT_CLUSTER_NAME.to_owned()
}

fn default_node_groups_path() -> String {
    String::from("node-groups.yaml")
}

fn default_kubernetes_timeout_cap() -> Duration {
    Duration::from_secs(300)
}

fn default_kubernetes_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_readiness_timeout_seconds() -> u64 {
    DEFAULT_READINESS_TIMEOUT_SECONDS
}

fn default_readiness_poll_interval_seconds() -> u64 {
    DEFAULT_READINESS_POLL_INTERVAL_SECONDS
}

fn resolve_region(configured: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
    configured
        .map(String::from)
        .or_else(|| env("AWS_REGION"))
        .or_else(|| env("AWS_DEFAULT_REGION"))
        .filter(|region| !region.is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_owned())
}

pub fn load_config(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let config_path = match path {
        Some(path) => path.to_owned(),
        None => get_config_path()?,
    };

    let file = match File::open(&config_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %config_path, "Config file not found, using defaults");
            return Ok(Arc::new(Config::default()));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open config file {}", &config_path))
        }
    };

    let config = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse config file {}", &config_path))?;

    Ok(Arc::new(config))
}

fn get_config_path() -> anyhow::Result<String> {
    use std::env;

    env::var("APP_CONFIG").or_else(|e| {
        info!(
            error = format!("{:?}", e).as_str(),
            "Missing or invalid APP_CONFIG env var, fallback to config.yml"
        );
        Ok("config.yml".to_string())
    })
}

/// Loads the node group definitions. A missing or unreadable file yields no node groups,
/// invalid readiness settings are an error.
pub fn load_node_groups(path: &str) -> anyhow::Result<BTreeMap<String, NodeGroup>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(%path, error = %e, "Unable to read node groups file, assuming no node groups");
            return Ok(BTreeMap::new());
        }
    };

    parse_node_groups(&content, path)
}

fn parse_node_groups(content: &str, path: &str) -> anyhow::Result<BTreeMap<String, NodeGroup>> {
    if content.trim().is_empty() {
        warn!(%path, "Node groups file is empty");
        return Ok(BTreeMap::new());
    }

    let node_groups = match serde_yaml::from_str::<Option<NodeGroups>>(content) {
        Ok(node_groups) => node_groups.unwrap_or_default().node_groups,
        Err(e) => {
            warn!(%path, error = %e, "Unable to parse node groups file, assuming no node groups");
            return Ok(BTreeMap::new());
        }
    };

    for (name, node_group) in &node_groups {
        node_group.validate(name)?;
    }

    Ok(node_groups)
}
