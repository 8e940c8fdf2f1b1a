use crate::eks::token::TokenGenerator;
use crate::error::Result;
use crate::kubernetes;
use crate::kubernetes::nodes::{count_ready, Nodes};
use crate::node_groups::{KubernetesContext, ScalingGroupRef};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait ReadyNodeCounter: Debug + Send + Sync {
    /// Number of nodes of the node group whose `Ready` condition is `True`.
    async fn count_ready_nodes(
        &self,
        group: &ScalingGroupRef,
        context: &KubernetesContext,
    ) -> Result<u32>;
}

/// Counts ready nodes through the cluster API, authenticating with a freshly minted token and
/// a client pinned to the cluster CA on every call.
#[derive(Debug, Clone)]
pub struct KubernetesNodeCounter {
    tokens: TokenGenerator,
    request_timeout: Duration,
}

impl KubernetesNodeCounter {
    pub fn new(tokens: TokenGenerator, request_timeout: Duration) -> Self {
        Self {
            tokens,
            request_timeout,
        }
    }
}

#[async_trait]
impl ReadyNodeCounter for KubernetesNodeCounter {
    #[tracing::instrument(
        name = "KubernetesNodeCounter::count_ready_nodes",
        skip(self, group, context),
        fields(node_group = %context.node_group_label)
    )]
    async fn count_ready_nodes(
        &self,
        group: &ScalingGroupRef,
        context: &KubernetesContext,
    ) -> Result<u32> {
        let token = self
            .tokens
            .generate(&context.cluster_name, &group.region)
            .await?;

        let client = kubernetes::Client::builder()
            .endpoint(context.cluster_endpoint.clone())
            .ca_data(context.cluster_ca_data.clone())
            .request_timeout(self.request_timeout)
            .build()?;

        let nodes = client
            .list_nodes(&context.label_selector(), token.as_str())
            .await?;
        debug!(nodes = nodes.len(), "Listed node group nodes");

        Ok(u32::try_from(count_ready(&nodes)).unwrap_or(u32::MAX))
    }
}
