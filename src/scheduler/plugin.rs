//! Filter and score plugins, grounded on the teacher's `Fit`/`LeastAllocatedResources`
//! pair (spec.md §4.6 "opaque collaborator" — the default implementation still needs
//! a concrete filter/score pipeline to be useful in tests and examples).

use crate::core::node::Node;
use crate::core::pod::Pod;

pub trait FilterPlugin: Send + Sync {
    fn filter<'a>(&self, pod: &'a Pod, nodes: Vec<&'a Node>) -> Vec<&'a Node>;
}

pub trait ScorePlugin: Send + Sync {
    fn score(&self, pod: &Pod, node: &Node) -> f64;
}

/// Rejects nodes that are unschedulable, whose taints the pod doesn't tolerate, or
/// that lack capacity for the pod's requests.
pub struct Fit;

impl FilterPlugin for Fit {
    fn filter<'a>(&self, pod: &'a Pod, nodes: Vec<&'a Node>) -> Vec<&'a Node> {
        let requests = pod.spec.resources.requests;
        nodes
            .into_iter()
            .filter(|node| !node.spec.unschedulable)
            .filter(|node| requests.fits_within(&node.status.allocatable))
            .filter(|node| {
                node.spec.taints.iter().all(|taint| pod.spec.tolerations.iter().any(|t| t.tolerates(taint)))
            })
            .filter(|node| {
                pod.spec
                    .node_selector
                    .iter()
                    .all(|(k, v)| node.metadata.labels.get(k).is_some_and(|nv| nv == v))
            })
            .collect()
    }
}

/// Prefers nodes with more headroom left after placement (spec.md's teacher ground:
/// `LeastAllocatedResources` — equal cpu/memory weight, percentage-of-allocatable).
pub struct LeastAllocatedResources;

impl ScorePlugin for LeastAllocatedResources {
    fn score(&self, pod: &Pod, node: &Node) -> f64 {
        let requests = pod.spec.resources.requests;
        let allocatable = node.status.allocatable;
        let cpu_score = pct_headroom(allocatable.cpu, requests.cpu);
        let mem_score = pct_headroom(allocatable.memory, requests.memory);
        (cpu_score + mem_score) / 2.0
    }
}

fn pct_headroom(allocatable: u64, requested: u64) -> f64 {
    if allocatable == 0 {
        return 0.0;
    }
    (allocatable.saturating_sub(requested)) as f64 * 100.0 / allocatable as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Resources;

    fn node_with(cpu: u64, memory: u64) -> Node {
        Node::new("n", Resources { cpu, memory, ephemeral_storage: 0 })
    }

    fn pod_requesting(cpu: u64, memory: u64) -> Pod {
        Pod::new("p", "default", Resources { cpu, memory, ephemeral_storage: 0 })
    }

    #[test]
    fn fit_rejects_insufficient_capacity() {
        let node = node_with(1, 1024);
        let pod = pod_requesting(2, 512);
        assert!(Fit.filter(&pod, vec![&node]).is_empty());
    }

    #[test]
    fn fit_rejects_unschedulable_node() {
        let mut node = node_with(4, 4096);
        node.spec.unschedulable = true;
        let pod = pod_requesting(1, 512);
        assert!(Fit.filter(&pod, vec![&node]).is_empty());
    }

    #[test]
    fn least_allocated_prefers_larger_node() {
        let small = node_with(2, 2048);
        let large = node_with(8, 8192);
        let pod = pod_requesting(1, 1024);
        assert!(LeastAllocatedResources.score(&pod, &large) > LeastAllocatedResources.score(&pod, &small));
    }
}
