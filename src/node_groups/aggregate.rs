use crate::error::Result;
use crate::node_groups::{ReadinessController, RunMode};
use futures::future::try_join_all;
use tracing::info;

/// A node group's readiness controller together with its owner's decision to wait for it.
#[derive(Debug)]
pub struct AwaitedGroup {
    pub name: String,
    pub await_ready: bool,
    pub controller: ReadinessController,
}

/// Resolves to `true` once every group that opted into waiting is ready. Groups that did not
/// opt in are never polled.
#[tracing::instrument(name = "node_groups::await_all", skip(groups))]
pub async fn await_all(groups: &[AwaitedGroup], mode: RunMode) -> Result<bool> {
    let awaited: Vec<&AwaitedGroup> = groups.iter().filter(|g| g.await_ready).collect();

    if awaited.is_empty() {
        info!("No node groups configured with await=true, skipping readiness wait");
        return Ok(true);
    }

    if mode == RunMode::DryRun {
        info!(
            node_groups = awaited.len(),
            "Preview run, skipping readiness wait for awaited node groups"
        );
        return Ok(true);
    }

    let names: Vec<&str> = awaited.iter().map(|g| g.name.as_str()).collect();
    info!(node_groups = ?names, "Waiting for node groups to report readiness");

    let ready = try_join_all(awaited.iter().map(|g| g.controller.ready())).await?;
    let all_ready = ready.into_iter().all(|r| r);

    if all_ready {
        info!("All awaited node groups report readiness");
    }

    Ok(all_ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::node_groups::mock::{Count, Describe, MockNodeCounter, MockScalingGroups};
    use crate::node_groups::{ReadinessPolicy, ScalingGroupRef};
    use std::sync::Arc;
    use std::time::Duration;

    fn awaited_group(
        name: &str,
        await_ready: bool,
        mode: RunMode,
        scaling_groups: Arc<MockScalingGroups>,
    ) -> AwaitedGroup {
        AwaitedGroup {
            name: name.to_owned(),
            await_ready,
            controller: ReadinessController::new(
                ScalingGroupRef {
                    name: format!("infra-cluster-{}", name),
                    region: String::from("eu-west-2"),
                },
                ReadinessPolicy::new(Duration::from_secs(30), Duration::from_secs(10)).unwrap(),
                mode,
                scaling_groups,
                Arc::new(MockNodeCounter::new(vec![Count::Ready(0)])),
                Arc::new(ManualClock::new()),
            ),
        }
    }

    fn healthy() -> Arc<MockScalingGroups> {
        Arc::new(MockScalingGroups::new(vec![Describe::Group {
            desired: 2,
            healthy: 2,
        }]))
    }

    #[tokio::test]
    async fn test_no_awaited_groups() -> Result<()> {
        let scaling_groups = healthy();
        let groups = vec![awaited_group(
            "workers",
            false,
            RunMode::Apply,
            scaling_groups.clone(),
        )];

        assert!(await_all(&groups, RunMode::Apply).await?);
        assert!(await_all(&[], RunMode::Apply).await?);
        assert_eq!(0, scaling_groups.calls());

        Ok(())
    }

    #[tokio::test]
    async fn test_dry_run_does_not_poll() -> Result<()> {
        let scaling_groups = healthy();
        let groups = vec![awaited_group(
            "workers",
            true,
            RunMode::DryRun,
            scaling_groups.clone(),
        )];

        assert!(await_all(&groups, RunMode::DryRun).await?);
        assert_eq!(0, scaling_groups.calls());

        Ok(())
    }

    #[tokio::test]
    async fn test_waits_for_all_awaited_groups() -> Result<()> {
        let workers = Arc::new(MockScalingGroups::new(vec![
            Describe::Group {
                desired: 2,
                healthy: 0,
            },
            Describe::Group {
                desired: 2,
                healthy: 2,
            },
        ]));
        let gpu = healthy();
        let batch = healthy();
        let groups = vec![
            awaited_group("workers", true, RunMode::Apply, workers.clone()),
            awaited_group("gpu", true, RunMode::Apply, gpu.clone()),
            awaited_group("batch", false, RunMode::Apply, batch.clone()),
        ];

        assert!(await_all(&groups, RunMode::Apply).await?);
        assert_eq!(2, workers.calls());
        assert_eq!(1, gpu.calls());
        assert_eq!(0, batch.calls());

        Ok(())
    }

    #[tokio::test]
    async fn test_propagates_outer_timeout() {
        let flaky = Arc::new(MockScalingGroups::new(vec![Describe::Group {
            desired: 1,
            healthy: 0,
        }]));
        let groups = vec![
            awaited_group("workers", true, RunMode::Apply, healthy()),
            awaited_group("flaky", true, RunMode::Apply, flaky),
        ];

        let error = await_all(&groups, RunMode::Apply).await.unwrap_err();

        assert!(matches!(error.kind(), ErrorKind::Timeout { group, .. } if group == "infra-cluster-flaky"));
    }
}
