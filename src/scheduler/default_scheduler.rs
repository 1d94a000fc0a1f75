//! Default `PodSchedulingAlgorithm` plus the polling loop the launcher drives
//! against a view (spec.md §4.6, §4.7 step 3/4).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::pod::Pod;
use crate::errors::SchedulerError;
use crate::scheduler::interface::{PodSchedulingAlgorithm, ScheduleError};
use crate::scheduler::plugin::{Fit, FilterPlugin, LeastAllocatedResources, ScorePlugin};
use crate::view::View;

/// Filter-then-score scheduler, grounded on the teacher's `Fit` +
/// `LeastAllocatedResources` plugin pair (`core/scheduler/plugin.rs`).
pub struct DefaultScheduler {
    filter: Box<dyn FilterPlugin>,
    score: Box<dyn ScorePlugin>,
}

impl Default for DefaultScheduler {
    fn default() -> Self {
        Self {
            filter: Box::new(Fit),
            score: Box::new(LeastAllocatedResources),
        }
    }
}

impl PodSchedulingAlgorithm for DefaultScheduler {
    fn schedule_one(&self, pod: &Pod, nodes: &[&crate::core::node::Node]) -> Result<String, ScheduleError> {
        let requests = pod.spec.resources.requests;
        if requests.cpu == 0 && requests.memory == 0 {
            return Err(ScheduleError::RequestedResourcesAreZero);
        }
        let candidates = self.filter.filter(pod, nodes.to_vec());
        candidates
            .into_iter()
            .max_by(|a, b| self.score.score(pod, a).total_cmp(&self.score.score(pod, b)))
            .map(|n| n.name().to_string())
            .ok_or(ScheduleError::NoSufficientNodes)
    }
}

/// Drives one `DefaultScheduler` instance against a view's pending pods until
/// cancelled, at a fixed poll interval (spec.md §4.6 "instantiates a scheduler bound
/// to the view... starts it in a background task").
pub async fn run(view: Arc<dyn View>, algorithm: Arc<dyn PodSchedulingAlgorithm>, poll_interval: Duration, cancel: CancellationToken) -> Result<(), SchedulerError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(poll_interval) => {}
        }
        let (pods, _) = view.list_pods(None).map_err(|e| SchedulerError::Launch(e.to_string()))?;
        let pending: Vec<Pod> = pods.into_iter().filter(|p| p.is_pending_decision()).collect();
        if pending.is_empty() {
            continue;
        }
        let (nodes, _) = view.list_nodes().map_err(|e| SchedulerError::Launch(e.to_string()))?;
        let node_refs: Vec<&crate::core::node::Node> = nodes.iter().collect();
        for pod in pending {
            match algorithm.schedule_one(&pod, &node_refs) {
                Ok(node_name) => {
                    let _ = view.update_pod_node_binding(&pod.metadata.namespace, &pod.metadata.name, &node_name);
                }
                Err(_) => {
                    let mut unscheduled = pod;
                    unscheduled.set_unschedulable(chrono::Utc::now());
                    let _ = view.update_pod(unscheduled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Resources;
    use crate::core::node::Node;

    #[test]
    fn schedule_one_picks_a_fitting_node() {
        let scheduler = DefaultScheduler::default();
        let node = Node::new("n1", Resources { cpu: 4, memory: 4096, ephemeral_storage: 0 });
        let pod = Pod::new("p1", "default", Resources { cpu: 1, memory: 512, ephemeral_storage: 0 });
        assert_eq!(scheduler.schedule_one(&pod, &[&node]).unwrap(), "n1");
    }

    #[test]
    fn schedule_one_fails_with_no_sufficient_nodes() {
        let scheduler = DefaultScheduler::default();
        let node = Node::new("n1", Resources { cpu: 1, memory: 512, ephemeral_storage: 0 });
        let pod = Pod::new("p1", "default", Resources { cpu: 4, memory: 4096, ephemeral_storage: 0 });
        assert_eq!(scheduler.schedule_one(&pod, &[&node]).unwrap_err(), ScheduleError::NoSufficientNodes);
    }
}
