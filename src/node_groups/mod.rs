//! Readiness of EKS node groups backed by Auto Scaling Groups.

mod aggregate;
mod cluster;
mod controller;
#[cfg(test)]
mod mock;

use crate::config;
use crate::error::{ErrorKind, Result};
use serde::Serialize;
use std::time::Duration;

pub use aggregate::{await_all, AwaitedGroup};
pub use cluster::{KubernetesNodeCounter, ReadyNodeCounter};
pub use controller::ReadinessController;

pub const NODE_GROUP_LABEL_KEY: &str = "NodeGroup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingGroupRef {
    pub name: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RunMode {
    Apply,
    DryRun,
}

#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    timeout: Duration,
    poll_interval: Duration,
    kubernetes_timeout_cap: Duration,
    kubernetes: Option<KubernetesContext>,
}

impl ReadinessPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(ErrorKind::InvalidConfig(String::from("timeout must be positive")).into());
        }
        if poll_interval.is_zero() {
            return Err(
                ErrorKind::InvalidConfig(String::from("poll interval must be positive")).into(),
            );
        }

        Ok(Self {
            timeout,
            poll_interval,
            kubernetes_timeout_cap: Duration::from_secs(300),
            kubernetes: None,
        })
    }

    pub fn from_config(
        node_group: &config::NodeGroup,
        readiness: &config::Readiness,
        kubernetes: Option<KubernetesContext>,
    ) -> Result<Self> {
        let policy = Self::new(
            Duration::from_secs(node_group.readiness_timeout_seconds),
            Duration::from_secs(node_group.readiness_poll_interval_seconds),
        )?
        .with_kubernetes_timeout_cap(readiness.kubernetes_timeout_cap);

        Ok(match kubernetes {
            Some(kubernetes) => policy.with_kubernetes(kubernetes),
            None => policy,
        })
    }

    pub fn with_kubernetes(mut self, kubernetes: KubernetesContext) -> Self {
        self.kubernetes = Some(kubernetes);
        self
    }

    pub fn with_kubernetes_timeout_cap(mut self, cap: Duration) -> Self {
        self.kubernetes_timeout_cap = cap;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn kubernetes(&self) -> Option<&KubernetesContext> {
        self.kubernetes.as_ref()
    }

    /// Time allowed for the node check once the instances are healthy.
    pub fn kubernetes_budget(&self) -> Duration {
        self.timeout.min(self.kubernetes_timeout_cap)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(config::DEFAULT_READINESS_TIMEOUT_SECONDS),
            poll_interval: Duration::from_secs(config::DEFAULT_READINESS_POLL_INTERVAL_SECONDS),
            kubernetes_timeout_cap: Duration::from_secs(300),
            kubernetes: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KubernetesContext {
    pub cluster_name: String,
    pub cluster_endpoint: String,
    /// Base64 encoded PEM.
    pub cluster_ca_data: String,
    pub node_group_label: String,
}

impl KubernetesContext {
    pub fn is_complete(&self) -> bool {
        !(self.cluster_name.is_empty()
            || self.cluster_endpoint.is_empty()
            || self.cluster_ca_data.is_empty()
            || self.node_group_label.is_empty())
    }

    pub fn label_selector(&self) -> String {
        format!("{}={}", NODE_GROUP_LABEL_KEY, self.node_group_label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessResult {
    pub asg_name: String,
    pub desired_capacity: u32,
    pub healthy_instances: u32,
    pub kubernetes: Option<KubernetesDetails>,
}

impl ReadinessResult {
    fn preview(asg_name: &str) -> Self {
        Self {
            asg_name: asg_name.to_owned(),
            desired_capacity: 0,
            healthy_instances: 0,
            kubernetes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KubernetesDetails {
    pub node_group: String,
    pub ready_nodes: u32,
    pub expected_ready_nodes: u32,
    pub status: KubernetesStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KubernetesStatus {
    Ready,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> KubernetesContext {
        KubernetesContext {
            cluster_name: String::from("infra-cluster"),
            cluster_endpoint: String::from("https://example.eks.amazonaws.com"),
            cluster_ca_data: String::from("LS0t"),
            node_group_label: String::from("gpu"),
        }
    }

    #[test]
    fn test_policy_rejects_zero_durations() {
        assert!(ReadinessPolicy::new(Duration::ZERO, Duration::from_secs(15)).is_err());
        assert!(ReadinessPolicy::new(Duration::from_secs(900), Duration::ZERO).is_err());
    }

    #[test]
    fn test_kubernetes_budget_is_capped() -> Result<()> {
        let policy = ReadinessPolicy::new(Duration::from_secs(900), Duration::from_secs(15))?;
        assert_eq!(Duration::from_secs(300), policy.kubernetes_budget());

        let policy = ReadinessPolicy::new(Duration::from_secs(120), Duration::from_secs(15))?;
        assert_eq!(Duration::from_secs(120), policy.kubernetes_budget());

        Ok(())
    }

    #[test]
    fn test_context_completeness() {
        assert!(context().is_complete());
        assert!(!KubernetesContext {
            cluster_ca_data: String::new(),
            ..context()
        }
        .is_complete());
        assert!(!KubernetesContext {
            cluster_endpoint: String::new(),
            ..context()
        }
        .is_complete());
    }

    #[test]
    fn test_label_selector() {
        assert_eq!("NodeGroup=gpu", context().label_selector());
    }

    #[test]
    fn test_result_serialization() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let result = ReadinessResult {
            asg_name: String::from("infra-cluster-gpu"),
            desired_capacity: 2,
            healthy_instances: 2,
            kubernetes: Some(KubernetesDetails {
                node_group: String::from("gpu"),
                ready_nodes: 0,
                expected_ready_nodes: 2,
                status: KubernetesStatus::Failed,
            }),
        };

        assert_eq!(
            serde_json::json!({
                "asg_name": "infra-cluster-gpu",
                "desired_capacity": 2,
                "healthy_instances": 2,
                "kubernetes": {
                    "node_group": "gpu",
                    "ready_nodes": 0,
                    "expected_ready_nodes": 2,
                    "status": "failed"
                }
            }),
            serde_json::to_value(&result)?
        );
        assert_eq!("ready", KubernetesStatus::Ready.to_string());

        Ok(())
    }
}
