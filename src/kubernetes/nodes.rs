use super::Result;
use crate::kubernetes::request::get;
use crate::kubernetes::Client;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use serde::Deserialize;
use std::fmt::Debug;

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<Node>,
}

#[async_trait]
pub trait Nodes: Debug + Send + Sync {
    async fn list_nodes(&self, label_selector: &str, bearer_token: &str) -> Result<Vec<Node>>;
}

#[async_trait]
impl Nodes for Client {
    #[tracing::instrument(name = "kubernetes::Client::list_nodes", skip(self, bearer_token))]
    async fn list_nodes(&self, label_selector: &str, bearer_token: &str) -> Result<Vec<Node>> {
        let list: NodeList = get(
            self,
            "/api/v1/nodes",
            &[("labelSelector", label_selector)],
            bearer_token,
        )
        .await?;

        Ok(list.items)
    }
}

/// A node is ready once its `Ready` condition reports `True`.
pub fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

pub fn count_ready(nodes: &[Node]) -> usize {
    nodes.iter().filter(|node| is_ready(node)).count()
}
