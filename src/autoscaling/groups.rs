use super::Result;
use crate::autoscaling::request::post_action;
use crate::autoscaling::Client;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Debug;

pub const IN_SERVICE: &str = "InService";
pub const HEALTHY: &str = "Healthy";

/// One describe response for a single Auto Scaling Group.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScalingGroup {
    #[serde(rename = "AutoScalingGroupName")]
    pub name: String,
    pub desired_capacity: u32,
    #[serde(default, deserialize_with = "members")]
    pub instances: Vec<Instance>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_id: String,
    pub lifecycle_state: String,
    pub health_status: String,
    #[serde(default)]
    pub availability_zone: Option<String>,
}

impl Instance {
    /// Provider states are compared verbatim, `inservice` is not `InService`.
    pub fn is_healthy(&self) -> bool {
        self.lifecycle_state == IN_SERVICE && self.health_status == HEALTHY
    }
}

impl ScalingGroup {
    pub fn healthy_instances(&self) -> u32 {
        self.instances.iter().filter(|i| i.is_healthy()).count() as u32
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeAutoScalingGroupsResponse {
    describe_auto_scaling_groups_result: DescribeAutoScalingGroupsResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeAutoScalingGroupsResult {
    #[serde(default, deserialize_with = "members")]
    auto_scaling_groups: Vec<ScalingGroup>,
}

/// Query API lists wrap every entry in a `<member>` element.
#[derive(Debug, Deserialize)]
struct Members<T> {
    #[serde(default = "Vec::new")]
    member: Vec<T>,
}

fn members<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Members::deserialize(deserializer).map(|m| m.member)
}

#[async_trait]
pub trait ScalingGroups: Debug + Send + Sync {
    /// Returns `None` when the provider knows no group with that name.
    async fn describe_group(&self, name: &str) -> Result<Option<ScalingGroup>>;
}

#[async_trait]
impl ScalingGroups for Client {
    #[tracing::instrument(name = "autoscaling::Client::describe_group", skip(self))]
    async fn describe_group(&self, name: &str) -> Result<Option<ScalingGroup>> {
        let response: DescribeAutoScalingGroupsResponse = post_action(
            self,
            "DescribeAutoScalingGroups",
            &[("AutoScalingGroupNames.member.1", name)],
        )
        .await?;

        Ok(response
            .describe_auto_scaling_groups_result
            .auto_scaling_groups
            .into_iter()
            .next())
    }
}
