//! Simulation (C7): one `(nodePool, nodeTemplate, availabilityZone)` candidate run
//! against a dedicated sandbox view (spec.md §4.7).

use std::collections::BTreeMap;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::core::common::{KubeObject, Resources};
use crate::core::node::Node;
use crate::core::objects::{Candidate, NodeScore, NodePool, NodeTemplate};
use crate::errors::SimulationError;
use crate::scheduler::SchedulerLauncher;
use crate::view::sandbox::SandboxView;
use crate::view::{SandboxRegistry, View};

/// Result of running one simulation to stabilization (spec.md §4.7 step 6). Carries
/// enough of the constraint to be scored without re-threading pool/template lookups
/// through the scoring pipeline.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub simulation_id: String,
    pub candidate: Candidate,
    pub candidate_region: String,
    pub instance_type: String,
    pub node_name: String,
    pub scaled_allocatable: Resources,
    pub requests_on_scaled_node: Resources,
    pub requests_on_other_nodes: Resources,
    pub scaled_assignment: Vec<String>,
    pub other_assignments: Vec<String>,
    pub unscheduled_pods: Vec<String>,
}

impl SimulationOutcome {
    pub fn to_node_score(&self, value: f64, hourly_price: f64) -> NodeScore {
        NodeScore {
            simulation_id: self.simulation_id.clone(),
            candidate: self.candidate.clone(),
            value,
            scaled_allocatable: self.scaled_allocatable,
            hourly_price,
            unscheduled_pods: self.unscheduled_pods.clone(),
            scaled_assignment: self.scaled_assignment.clone(),
            other_assignments: self.other_assignments.clone(),
        }
    }
}

/// Configured duration/poll parameters for stabilization tracking (spec.md §4.7
/// step 4, §6 suggests "5-10s of wall clock in tests").
#[derive(Debug, Clone, Copy)]
pub struct StabilizationConfig {
    pub window: Duration,
    pub poll_interval: Duration,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Builds the synthetic node object from a template: merged labels (pool + zone +
/// `simulation-id`), taints, and allocatable trimmed by reserved/eviction thresholds
/// (spec.md §4.7 step 1).
pub fn build_synthetic_node(pool: &NodePool, template: &NodeTemplate, zone: &str, simulation_id: &str, node_name: &str) -> Node {
    let mut node = Node::new(node_name, template.capacity);
    node.status.allocatable = template.allocatable();
    node.spec.taints = pool.taints.clone();
    node.metadata.labels = BTreeMap::from_iter(pool.labels.clone());
    node.metadata.labels.insert("topology.kubernetes.io/zone".to_string(), zone.to_string());
    node.metadata.labels.insert("scaling-advisor/simulation-id".to_string(), simulation_id.to_string());
    node.metadata.labels.insert("node.kubernetes.io/instance-type".to_string(), template.instance_type.clone());
    node
}

/// Steps 3-5: launch the scheduler bound to `sandbox`, poll to stabilization, then
/// stop it — on every exit path, including cancellation, so the caller can always
/// unmount the sandbox immediately afterwards.
async fn run_to_stabilization(
    sandbox: &Arc<dyn View>,
    simulation_id: &str,
    initially_pending: &[String],
    launcher: &Arc<SchedulerLauncher>,
    stabilization: StabilizationConfig,
    cancel: &CancellationToken,
) -> Result<(), SimulationError> {
    let handle = launcher.launch(simulation_id.to_string(), sandbox.clone()).await?;

    let deadline = Instant::now() + stabilization.window;
    loop {
        let (pods, _) = sandbox.list_pods(None)?;
        let still_pending = pods.iter().filter(|p| initially_pending.contains(&p.key())).any(|p| p.is_pending_decision());
        if !still_pending || Instant::now() >= deadline {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(stabilization.poll_interval) => {}
            _ = cancel.cancelled() => {
                handle.stop().await;
                return Err(SimulationError::Cancelled);
            }
        }
    }

    handle.stop().await;
    Ok(())
}

/// Runs one candidate to stabilization against a fresh sandbox over `base`.
///
/// `cancel` is the simulation group's shared token (spec.md §5 "the group cancels
/// all siblings on first error"): checked before launch and raced against every
/// stabilization poll, so a sibling's failure stops this simulation promptly instead
/// of letting it run to its own stabilization window.
///
/// `registry`, when set, mounts the sandbox under `/{simulation_id}/...` for the
/// duration of the run (spec.md §4.5 "each sandbox is mounted under
/// `/{sandboxName}/...`"), unmounting it on every exit path so failed or cancelled
/// simulations don't leak a stale mount.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    simulation_id: String,
    candidate: Candidate,
    pool: NodePool,
    template: NodeTemplate,
    zone: String,
    base: Arc<dyn View>,
    counter: Arc<AtomicI64>,
    watch_queue_size: usize,
    launcher: Arc<SchedulerLauncher>,
    stabilization: StabilizationConfig,
    cancel: CancellationToken,
    registry: Option<Arc<dyn SandboxRegistry>>,
) -> Result<SimulationOutcome, SimulationError> {
    if cancel.is_cancelled() {
        return Err(SimulationError::Cancelled);
    }

    let node_name = candidate.synthetic_node_name(&simulation_id);

    // Step 1-2: build and inject the synthetic node into a fresh sandbox.
    let sandbox: Arc<dyn View> = Arc::new(SandboxView::new(base, counter, watch_queue_size));
    let node = build_synthetic_node(&pool, &template, &zone, &simulation_id, &node_name);
    sandbox.store_node(node).map_err(|e| SimulationError::Create(e.to_string()))?;

    let (initial_pods, _) = sandbox.list_pods(None)?;
    let initially_pending: Vec<String> = initial_pods.iter().filter(|p| p.is_pending_decision()).map(|p| p.key()).collect();

    if let Some(registry) = &registry {
        registry.mount(simulation_id.clone(), sandbox.clone());
    }
    let result = run_to_stabilization(&sandbox, &simulation_id, &initially_pending, &launcher, stabilization, &cancel).await;
    if let Some(registry) = &registry {
        registry.unmount(&simulation_id);
    }
    result?;

    // Step 6: compute the result.
    let (final_pods, _) = sandbox.list_pods(None)?;
    let mut scaled_assignment = Vec::new();
    let mut other_assignments = Vec::new();
    let mut unscheduled_pods = Vec::new();
    let mut requests_on_scaled_node = Resources::default();
    let mut requests_on_other_nodes = Resources::default();

    for pod in &final_pods {
        if !initially_pending.contains(&pod.key()) {
            continue;
        }
        if pod.is_scheduled() && pod.spec.node_name == node_name {
            scaled_assignment.push(pod.key());
            requests_on_scaled_node = requests_on_scaled_node.saturating_add(&pod.spec.resources.requests);
        } else if pod.is_scheduled() {
            other_assignments.push(pod.key());
            requests_on_other_nodes = requests_on_other_nodes.saturating_add(&pod.spec.resources.requests);
        } else {
            unscheduled_pods.push(pod.key());
        }
    }

    Ok(SimulationOutcome {
        simulation_id,
        candidate,
        candidate_region: pool.region.clone(),
        instance_type: template.instance_type.clone(),
        node_name,
        scaled_allocatable: template.allocatable(),
        requests_on_scaled_node,
        requests_on_other_nodes,
        scaled_assignment,
        other_assignments,
        unscheduled_pods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::objects::{BackoffPolicy, ScaleInPolicy};

    fn pool() -> NodePool {
        NodePool {
            name: "p".to_string(),
            region: "us-east".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            taints: vec![],
            zones: vec!["z".to_string()],
            node_templates: vec![],
            quota: None,
            scale_in_policy: Some(ScaleInPolicy::default()),
            backoff_policy: Some(BackoffPolicy::default()),
            priority: 1,
        }
    }

    fn template() -> NodeTemplate {
        NodeTemplate {
            name: "t".to_string(),
            instance_type: "m5.large".to_string(),
            capacity: Resources { cpu: 4, memory: 4096, ephemeral_storage: 0 },
            kube_reserved: Resources::default(),
            system_reserved: Resources::default(),
            eviction_hard: Resources::default(),
            max_volumes: 8,
            priority: 1,
        }
    }

    #[test]
    fn build_synthetic_node_applies_labels_and_allocatable() {
        let node = build_synthetic_node(&pool(), &template(), "z", "sim-1", "sim-p-t-z-sim-1");
        assert_eq!(node.metadata.labels.get("topology.kubernetes.io/zone").unwrap(), "z");
        assert_eq!(node.status.allocatable, template().allocatable());
    }
}
