use crate::autoscaling;
use crate::aws;
use crate::autoscaling::groups::{Instance, ScalingGroup, ScalingGroups};
use crate::error::{ErrorKind, Result};
use crate::node_groups::cluster::ReadyNodeCounter;
use crate::node_groups::{KubernetesContext, ScalingGroupRef};
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Describe {
    Group {
        desired: u32,
        healthy: u32,
    },
    /// Explicit `(lifecycle_state, health_status)` per instance.
    Instances {
        desired: u32,
        states: Vec<(&'static str, &'static str)>,
    },
    Missing,
    Throttled,
    NoCredentials,
}

/// Replays scripted describe responses, repeating the last one once exhausted.
#[derive(Debug)]
pub struct MockScalingGroups {
    script: Mutex<VecDeque<Describe>>,
    calls: AtomicUsize,
}

impl MockScalingGroups {
    pub fn new(script: Vec<Describe>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScalingGroups for MockScalingGroups {
    async fn describe_group(&self, name: &str) -> autoscaling::Result<Option<ScalingGroup>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = next(&self.script);

        match step {
            Describe::Group { desired, healthy } => Ok(Some(group(name, desired, healthy))),
            Describe::Instances { desired, states } => Ok(Some(ScalingGroup {
                name: name.to_owned(),
                desired_capacity: desired,
                instances: states
                    .into_iter()
                    .enumerate()
                    .map(|(i, (lifecycle_state, health_status))| Instance {
                        instance_id: format!("i-{:04}", i),
                        lifecycle_state: lifecycle_state.to_owned(),
                        health_status: health_status.to_owned(),
                        availability_zone: None,
                    })
                    .collect(),
            })),
            Describe::Missing => Ok(None),
            Describe::Throttled => Err(autoscaling::error::Error::BadResponse {
                status: StatusCode::BAD_REQUEST,
                headers: HeaderMap::new(),
                body: String::from("Throttling"),
            }),
            Describe::NoCredentials => Err(autoscaling::error::Error::Credentials(
                aws::error::Error::MissingCredentials,
            )),
        }
    }
}

fn group(name: &str, desired: u32, healthy: u32) -> ScalingGroup {
    let instance = |i: u32, lifecycle_state: &str| Instance {
        instance_id: format!("i-{:04}", i),
        lifecycle_state: lifecycle_state.to_owned(),
        health_status: String::from("Healthy"),
        availability_zone: Some(String::from("eu-west-2a")),
    };

    let mut instances: Vec<Instance> = (0..healthy).map(|i| instance(i, "InService")).collect();
    instances.extend((healthy..desired).map(|i| instance(i, "Pending")));

    ScalingGroup {
        name: name.to_owned(),
        desired_capacity: desired,
        instances,
    }
}

#[derive(Debug, Clone)]
pub enum Count {
    Ready(u32),
    Transient(&'static str),
    MissingCredentials,
}

#[derive(Debug)]
pub struct MockNodeCounter {
    script: Mutex<VecDeque<Count>>,
    calls: AtomicUsize,
}

impl MockNodeCounter {
    pub fn new(script: Vec<Count>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadyNodeCounter for MockNodeCounter {
    async fn count_ready_nodes(
        &self,
        _group: &ScalingGroupRef,
        _context: &KubernetesContext,
    ) -> Result<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match next(&self.script) {
            Count::Ready(ready) => Ok(ready),
            Count::Transient(message) => Err(anyhow::anyhow!(message).into()),
            Count::MissingCredentials => Err(ErrorKind::MissingCredentials.into()),
        }
    }
}

fn next<T: Clone>(script: &Mutex<VecDeque<T>>) -> T {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front().unwrap()
    } else {
        script.front().cloned().expect("empty mock script")
    }
}
