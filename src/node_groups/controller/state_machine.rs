use crate::autoscaling::groups::{ScalingGroup, ScalingGroups};
use crate::clock::Clock;
use crate::error::{Error, ErrorKind, Result};
use crate::node_groups::cluster::ReadyNodeCounter;
use crate::node_groups::{
    KubernetesContext, KubernetesDetails, KubernetesStatus, ReadinessPolicy, ReadinessResult,
    ScalingGroupRef,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[async_trait]
trait Handler {
    async fn handle(self) -> ReadinessMachine;
}

#[derive(Debug)]
pub struct Data<S> {
    shared: Shared,
    state: S,
}

#[derive(Debug)]
pub struct Shared {
    group: ScalingGroupRef,
    policy: ReadinessPolicy,
    scaling_groups: Arc<dyn ScalingGroups>,
    nodes: Arc<dyn ReadyNodeCounter>,
    clock: Arc<dyn Clock>,
    started_at: Duration,
}

impl Shared {
    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started_at)
    }
}

#[derive(Debug)]
pub struct PollingInstances {
    attempt: u32,
}

#[async_trait]
impl Handler for Data<PollingInstances> {
    async fn handle(self) -> ReadinessMachine {
        let elapsed = self.shared.elapsed();
        if elapsed >= self.shared.policy.timeout() {
            return ReadinessMachine::TimedOut(Data {
                shared: self.shared,
                state: TimedOut { elapsed },
            });
        }

        let attempt = self.state.attempt + 1;
        match self
            .shared
            .scaling_groups
            .describe_group(&self.shared.group.name)
            .await
        {
            Ok(Some(group)) => {
                let desired_capacity = group.desired_capacity;
                let healthy_instances = group.healthy_instances();
                log_instances(&group);
                info!(
                    attempt,
                    desired_capacity, healthy_instances, "Polled Auto Scaling Group"
                );

                if desired_capacity == 0 || healthy_instances >= desired_capacity {
                    return self.healthy(desired_capacity, healthy_instances);
                }
            }
            Ok(None) => warn!(attempt, "Auto Scaling Group not found yet"),
            Err(e) => {
                let error = Error::from(e);
                if !error.is_transient() {
                    warn!(attempt, error = %error, "Failed to describe Auto Scaling Group, giving up");
                    return ReadinessMachine::Failed(Data {
                        shared: self.shared,
                        state: Failed { error },
                    });
                }
                warn!(attempt, error = %error, "Failed to describe Auto Scaling Group");
            }
        }

        info!(
            retry_in_secs = self.shared.policy.poll_interval().as_secs(),
            "Auto Scaling Group not healthy yet"
        );
        self.shared
            .clock
            .sleep(self.shared.policy.poll_interval())
            .await;

        ReadinessMachine::PollingInstances(Data {
            shared: self.shared,
            state: PollingInstances { attempt },
        })
    }
}

impl Data<PollingInstances> {
    fn healthy(self, desired_capacity: u32, healthy_instances: u32) -> ReadinessMachine {
        info!(
            desired_capacity,
            healthy_instances, "Auto Scaling Group is healthy"
        );

        let context = match self.shared.policy.kubernetes() {
            _ if desired_capacity == 0 => {
                info!("Desired capacity is 0, skipping Kubernetes node readiness check");
                None
            }
            Some(context) if context.is_complete() => Some(context.clone()),
            _ => {
                info!("Cluster connection details incomplete, skipping Kubernetes node readiness check");
                None
            }
        };

        match context {
            Some(context) => {
                let started_at = self.shared.clock.now();
                ReadinessMachine::PollingNodes(Data {
                    shared: self.shared,
                    state: PollingNodes {
                        context,
                        desired_capacity,
                        healthy_instances,
                        started_at,
                        attempt: 0,
                        last_error: None,
                    },
                })
            }
            None => {
                let result = ReadinessResult {
                    asg_name: self.shared.group.name.clone(),
                    desired_capacity,
                    healthy_instances,
                    kubernetes: None,
                };
                ReadinessMachine::Ready(Data {
                    shared: self.shared,
                    state: Ready { result },
                })
            }
        }
    }
}

fn log_instances(group: &ScalingGroup) {
    for instance in &group.instances {
        debug!(
            instance_id = %instance.instance_id,
            lifecycle_state = %instance.lifecycle_state,
            health_status = %instance.health_status,
            "Instance state"
        );
    }
}

#[derive(Debug)]
pub struct PollingNodes {
    context: KubernetesContext,
    desired_capacity: u32,
    healthy_instances: u32,
    started_at: Duration,
    attempt: u32,
    last_error: Option<String>,
}

#[async_trait]
impl Handler for Data<PollingNodes> {
    async fn handle(mut self) -> ReadinessMachine {
        let elapsed = self.elapsed();
        if elapsed >= self.shared.policy.kubernetes_budget() {
            let error = self.timeout(elapsed);
            warn!(error = %error, "Kubernetes node readiness check failed");

            return self.finish(0, KubernetesStatus::Failed);
        }

        self.state.attempt += 1;
        match self
            .shared
            .nodes
            .count_ready_nodes(&self.shared.group, &self.state.context)
            .await
        {
            Ok(ready_nodes) => {
                info!(
                    attempt = self.state.attempt,
                    ready_nodes,
                    expected_ready_nodes = self.state.desired_capacity,
                    "Polled Kubernetes nodes"
                );

                if ready_nodes >= self.state.desired_capacity {
                    return self.finish(ready_nodes, KubernetesStatus::Ready);
                }
            }
            Err(e) if e.is_transient() => {
                warn!(attempt = self.state.attempt, error = %e, "Failed to list Kubernetes nodes");
                self.state.last_error = Some(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, span_trace = %e.span_trace(), "Kubernetes node readiness check failed");

                return self.finish(0, KubernetesStatus::Failed);
            }
        }

        self.shared
            .clock
            .sleep(self.shared.policy.poll_interval())
            .await;

        ReadinessMachine::PollingNodes(self)
    }
}

impl Data<PollingNodes> {
    fn elapsed(&self) -> Duration {
        self.shared
            .clock
            .now()
            .saturating_sub(self.state.started_at)
    }

    /// The budget ran out, carrying the last transient failure seen.
    fn timeout(&mut self, elapsed: Duration) -> Error {
        Error::from(ErrorKind::KubernetesTimeout {
            node_group: self.state.context.node_group_label.clone(),
            elapsed_secs: elapsed.as_secs(),
            last_error: self.state.last_error.take(),
        })
    }

    fn finish(self, ready_nodes: u32, status: KubernetesStatus) -> ReadinessMachine {
        let result = ReadinessResult {
            asg_name: self.shared.group.name.clone(),
            desired_capacity: self.state.desired_capacity,
            healthy_instances: self.state.healthy_instances,
            kubernetes: Some(KubernetesDetails {
                node_group: self.state.context.node_group_label,
                ready_nodes,
                expected_ready_nodes: self.state.desired_capacity,
                status,
            }),
        };

        ReadinessMachine::Ready(Data {
            shared: self.shared,
            state: Ready { result },
        })
    }
}

#[derive(Debug)]
pub struct Ready {
    result: ReadinessResult,
}

#[derive(Debug)]
pub struct TimedOut {
    elapsed: Duration,
}

#[derive(Debug)]
pub struct Failed {
    error: Error,
}

#[derive(Debug)]
pub enum ReadinessMachine {
    PollingInstances(Data<PollingInstances>),
    PollingNodes(Data<PollingNodes>),
    Ready(Data<Ready>),
    TimedOut(Data<TimedOut>),
    Failed(Data<Failed>),
}

impl ReadinessMachine {
    pub fn new(
        group: ScalingGroupRef,
        policy: ReadinessPolicy,
        scaling_groups: Arc<dyn ScalingGroups>,
        nodes: Arc<dyn ReadyNodeCounter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();

        Self::PollingInstances(Data {
            shared: Shared {
                group,
                policy,
                scaling_groups,
                nodes,
                clock,
                started_at,
            },
            state: PollingInstances { attempt: 0 },
        })
    }

    pub async fn handle(self) -> Self {
        match self {
            Self::PollingInstances(m) => m.handle().await,
            Self::PollingNodes(m) => m.handle().await,
            Self::Ready(_) | Self::TimedOut(_) | Self::Failed(_) => self,
        }
    }

    /// Drives the machine until it reaches a terminal state.
    pub async fn run(mut self) -> Result<ReadinessResult> {
        loop {
            self = match self {
                Self::Ready(m) => return Ok(m.state.result),
                Self::TimedOut(m) => {
                    return Err(ErrorKind::Timeout {
                        group: m.shared.group.name,
                        elapsed_secs: m.state.elapsed.as_secs(),
                    }
                    .into())
                }
                Self::Failed(m) => return Err(m.state.error),
                machine => machine.handle().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::node_groups::mock::{Count, Describe, MockNodeCounter, MockScalingGroups};

    fn context() -> KubernetesContext {
        KubernetesContext {
            cluster_name: String::from("infra-cluster"),
            cluster_endpoint: String::from("https://example.eks.amazonaws.com"),
            cluster_ca_data: String::from("LS0tLS1CRUdJTg=="),
            node_group_label: String::from("gpu"),
        }
    }

    #[tokio::test]
    async fn test_kubernetes_timeout_reports_last_error() -> Result<()> {
        let nodes = Arc::new(MockNodeCounter::new(vec![
            Count::Ready(0),
            Count::Transient("HTTP 401"),
        ]));
        let mut machine = ReadinessMachine::new(
            ScalingGroupRef {
                name: String::from("infra-cluster-gpu"),
                region: String::from("eu-west-2"),
            },
            ReadinessPolicy::new(Duration::from_secs(60), Duration::from_secs(10))?
                .with_kubernetes(context()),
            Arc::new(MockScalingGroups::new(vec![Describe::Group {
                desired: 2,
                healthy: 2,
            }])),
            nodes.clone(),
            Arc::new(ManualClock::new()),
        );

        let mut polling = loop {
            machine = match machine.handle().await {
                ReadinessMachine::PollingNodes(m)
                    if m.elapsed() >= m.shared.policy.kubernetes_budget() =>
                {
                    break m;
                }
                ReadinessMachine::PollingNodes(m) => ReadinessMachine::PollingNodes(m),
                ReadinessMachine::PollingInstances(m) => ReadinessMachine::PollingInstances(m),
                other => panic!("left the node check early: {:?}", other),
            };
        };

        let elapsed = polling.elapsed();
        let error = polling.timeout(elapsed);

        assert_eq!(6, nodes.calls());
        assert!(matches!(
            error.kind(),
            ErrorKind::KubernetesTimeout { node_group, elapsed_secs: 60, last_error: Some(last) }
                if node_group == "gpu" && last == "HTTP 401"
        ));
        assert!(error.to_string().ends_with("Last seen error: HTTP 401"));

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_credentials_stop_instance_polling() {
        let scaling_groups = Arc::new(MockScalingGroups::new(vec![Describe::NoCredentials]));
        let machine = ReadinessMachine::new(
            ScalingGroupRef {
                name: String::from("infra-cluster-workers"),
                region: String::from("eu-west-2"),
            },
            ReadinessPolicy::default(),
            scaling_groups.clone(),
            Arc::new(MockNodeCounter::new(vec![Count::Ready(0)])),
            Arc::new(ManualClock::new()),
        );

        let error = machine.run().await.unwrap_err();

        assert!(matches!(error.kind(), ErrorKind::MissingCredentials));
        assert_eq!(1, scaling_groups.calls());
    }
}
