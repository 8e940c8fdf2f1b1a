mod state_machine;

use crate::autoscaling::groups::ScalingGroups;
use crate::clock::Clock;
use crate::error::Result;
use crate::node_groups::cluster::ReadyNodeCounter;
use crate::node_groups::controller::state_machine::ReadinessMachine;
use crate::node_groups::{ReadinessPolicy, ReadinessResult, RunMode, ScalingGroupRef};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Waits for one Auto Scaling Group (and optionally its Kubernetes nodes) to become ready.
/// The wait runs at most once to completion; later callers observe the memoized result.
#[derive(Debug)]
pub struct ReadinessController {
    group: ScalingGroupRef,
    policy: ReadinessPolicy,
    mode: RunMode,
    scaling_groups: Arc<dyn ScalingGroups>,
    nodes: Arc<dyn ReadyNodeCounter>,
    clock: Arc<dyn Clock>,
    details: OnceCell<ReadinessResult>,
}

impl ReadinessController {
    pub fn new(
        group: ScalingGroupRef,
        policy: ReadinessPolicy,
        mode: RunMode,
        scaling_groups: Arc<dyn ScalingGroups>,
        nodes: Arc<dyn ReadyNodeCounter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            group,
            policy,
            mode,
            scaling_groups,
            nodes,
            clock,
            details: OnceCell::new(),
        }
    }

    pub fn group(&self) -> &ScalingGroupRef {
        &self.group
    }

    pub async fn details(&self) -> Result<&ReadinessResult> {
        self.details
            .get_or_try_init(|| self.await_group_ready())
            .await
    }

    pub async fn ready(&self) -> Result<bool> {
        self.details().await.map(|_| true)
    }

    #[tracing::instrument(
        name = "ReadinessController::await_group_ready",
        skip(self),
        fields(asg = %self.group.name, region = %self.group.region, mode = %self.mode)
    )]
    async fn await_group_ready(&self) -> Result<ReadinessResult> {
        if self.mode == RunMode::DryRun {
            info!("Preview run, skipping readiness wait");
            return Ok(ReadinessResult::preview(&self.group.name));
        }

        info!(
            timeout_secs = self.policy.timeout().as_secs(),
            poll_interval_secs = self.policy.poll_interval().as_secs(),
            "Waiting for Auto Scaling Group to become healthy"
        );

        ReadinessMachine::new(
            self.group.clone(),
            self.policy.clone(),
            Arc::clone(&self.scaling_groups),
            Arc::clone(&self.nodes),
            Arc::clone(&self.clock),
        )
        .run()
        .await
    }
}

impl fmt::Display for ReadinessController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadinessController({})", self.group.name)
    }
}
