use super::Result;
use crate::eks::request::get;
use crate::eks::Client;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    pub endpoint: Option<String>,
    pub status: Option<String>,
    pub certificate_authority: Option<CertificateAuthority>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CertificateAuthority {
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeClusterResponse {
    cluster: Cluster,
}

impl Cluster {
    pub fn ca_data(&self) -> Option<&str> {
        self.certificate_authority
            .as_ref()
            .and_then(|ca| ca.data.as_deref())
    }
}

#[async_trait]
pub trait Clusters {
    async fn describe_cluster(&self, name: &str) -> Result<Cluster>;
}

#[async_trait]
impl Clusters for Client {
    #[tracing::instrument(name = "eks::Client::describe_cluster", skip(self))]
    async fn describe_cluster(&self, name: &str) -> Result<Cluster> {
        let path = format!("/clusters/{}", name);
        let response: DescribeClusterResponse = get(self, &path).await?;

        Ok(response.cluster)
    }
}
