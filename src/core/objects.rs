//! Scaling-advice domain objects: node templates, node pools, pricing, constraints,
//! and the score/advice types the generator produces (spec.md §3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::common::Resources;
use crate::core::node::Taint;
use crate::core::pod::Pod;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeTemplate {
    pub name: String,
    pub instance_type: String,
    pub capacity: Resources,
    #[serde(default)]
    pub kube_reserved: Resources,
    #[serde(default)]
    pub system_reserved: Resources,
    #[serde(default)]
    pub eviction_hard: Resources,
    #[serde(default)]
    pub max_volumes: u32,
    /// Lower number = higher priority (spec.md §3).
    #[serde(default)]
    pub priority: i32,
}

impl NodeTemplate {
    /// `capacity − kubeReserved − systemReserved − evictionThreshold` (spec.md §4.7 step 1).
    pub fn allocatable(&self) -> Resources {
        self.capacity
            .saturating_sub(&self.kube_reserved)
            .saturating_sub(&self.system_reserved)
            .saturating_sub(&self.eviction_hard)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ScaleInPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub utilization_threshold: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BackoffPolicy {
    #[serde(default)]
    pub initial_delay_seconds: f64,
    #[serde(default)]
    pub max_delay_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodePool {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    pub zones: Vec<String>,
    pub node_templates: Vec<NodeTemplate>,
    #[serde(default)]
    pub quota: Option<Resources>,
    #[serde(default)]
    pub scale_in_policy: Option<ScaleInPolicy>,
    #[serde(default)]
    pub backoff_policy: Option<BackoffPolicy>,
    /// Lower number = higher priority (spec.md §3).
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceEntry {
    pub region: String,
    pub instance_type: String,
    pub hourly_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PriceTable {
    pub entries: Vec<PriceEntry>,
}

impl PriceTable {
    pub fn price_for(&self, region: &str, instance_type: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.region == region && e.instance_type == instance_type)
            .map(|e| e.hourly_price)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ScalingConstraint {
    pub node_pools: Vec<NodePool>,
    #[serde(default)]
    pub prices: PriceTable,
}

/// One candidate `(nodePool, nodeTemplate, availabilityZone)` key (spec.md §4.7/§4.8).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub pool: String,
    pub template: String,
    pub zone: String,
}

impl Candidate {
    pub fn priority_key(&self, constraint: &ScalingConstraint) -> Option<(i32, i32)> {
        let pool = constraint.node_pools.iter().find(|p| p.name == self.pool)?;
        let template = pool.node_templates.iter().find(|t| t.name == self.template)?;
        Some((pool.priority, template.priority))
    }

    /// The synthetic node's stable name: a function of the candidate (spec.md §4.7 step 1).
    pub fn synthetic_node_name(&self, simulation_id: &str) -> String {
        format!("sim-{}-{}-{}-{}", self.pool, self.template, self.zone, simulation_id)
    }
}

/// Aggregated request info for one unscheduled pod (spec.md §3). Scheduling
/// requirements are carried verbatim on the embedded [`Pod`] and passed to the
/// scheduler opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodResourceInfo {
    pub pod: Pod,
}

impl PodResourceInfo {
    pub fn requests(&self) -> Resources {
        self.pod.spec.resources.requests
    }
}

/// The snapshot of cluster state an advice request carries (spec.md §6).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub nodes: Vec<crate::core::node::Node>,
    #[serde(default)]
    pub pods: Vec<Pod>,
    pub unscheduled_pods: Vec<Pod>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScalingAdviceRequest {
    pub id: String,
    pub correlation_id: String,
    pub constraint: ScalingConstraint,
    pub snapshot: ClusterSnapshot,
}

/// `(node-pool, node-template, availability-zone, delta)` (spec.md §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleItem {
    pub pool: String,
    pub template: String,
    pub zone: String,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeScore {
    pub simulation_id: String,
    pub candidate: Candidate,
    /// Lower-is-better for least-waste, higher-is-better for least-cost (spec.md §4.8).
    pub value: f64,
    pub scaled_allocatable: Resources,
    pub hourly_price: f64,
    pub unscheduled_pods: Vec<String>,
    /// Pod names scheduled onto the synthetic node.
    pub scaled_assignment: Vec<String>,
    /// Pod names scheduled onto other, pre-existing nodes during the same run —
    /// "ripple placements" the scorer must account for (spec.md §4.7 step 6).
    pub other_assignments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub passes: u32,
    pub simulations_run: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScalingAdviceEvent {
    PartialAdvice {
        id: String,
        scale_out_items: Vec<ScaleItem>,
        #[serde(default)]
        scale_in_items: Vec<ScaleItem>,
        residual_unscheduled: Vec<String>,
    },
    TerminalAdvice {
        id: String,
        consolidated_items: Vec<ScaleItem>,
        #[serde(default)]
        diagnostics: Option<Diagnostics>,
    },
    Error {
        id: String,
        correlation_id: String,
        cause: String,
    },
}

/// Opaque scheduling-requirement bag carried verbatim (spec.md §3): selectors,
/// tolerations, affinities. Used where a caller needs to stash arbitrary extra
/// scheduling hints that the core doesn't model as first-class fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulingRequirements(pub Value);
