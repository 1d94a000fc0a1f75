//! Advice Generator (C9): the pass loop over priority groups that turns a scaling
//! advice request into a stream of advice events (spec.md §4.9).
//!
//! Each pass runs every priority group in ascending `(nodePoolPriority,
//! nodeTemplatePriority)` order against the shared base view. A group's winner is
//! materialized into the base view immediately — this both lets the next group in
//! the same pass see a smaller pending set (the residual unscheduled pods become
//! that group's input) and gives the next pass the cumulative effect of every prior
//! winner, without separate bookkeeping.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::core::objects::{
    Candidate, ClusterSnapshot, Diagnostics, NodePool, NodeScore, NodeTemplate, ScaleItem, ScalingAdviceEvent, ScalingAdviceRequest,
    ScalingConstraint,
};
use crate::errors::{GenScalingAdviceError, GeneratorError};
use crate::scheduler::SchedulerLauncher;
use crate::simulation::group::{GroupMember, SimulationGroup};
use crate::simulation::scoring::{NodeScoreSelector, NodeScorer};
use crate::simulation::simulation::{self, SimulationOutcome, StabilizationConfig};
use crate::view::base::BaseView;
use crate::view::{SandboxRegistry, View};

/// `advice.generationMode` (spec.md §6): whether every pass's `PartialAdvice` is
/// emitted as it completes, or only the final `TerminalAdvice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Incremental,
    AllAtOnce,
}

/// Collaborators the generator needs beyond the request itself, bundled so callers
/// don't have to thread five Arc clones through every invocation.
pub struct GeneratorDeps {
    pub launcher: Arc<SchedulerLauncher>,
    pub scorer: Box<dyn NodeScorer>,
    pub selector: Box<dyn NodeScoreSelector>,
    pub stabilization: StabilizationConfig,
    pub watch_queue_size: usize,
    /// Mounts each simulation's sandbox over HTTP for its lifetime (spec.md §4.5).
    /// `None` in tests that don't stand up an API surface.
    pub registry: Option<Arc<dyn SandboxRegistry>>,
}

fn ordered_priority_groups(constraint: &ScalingConstraint) -> Vec<SimulationGroup> {
    let mut by_priority: BTreeMap<(i32, i32), Vec<GroupMember>> = BTreeMap::new();
    for pool in &constraint.node_pools {
        for template in &pool.node_templates {
            for zone in &pool.zones {
                let candidate = Candidate {
                    pool: pool.name.clone(),
                    template: template.name.clone(),
                    zone: zone.clone(),
                };
                by_priority.entry((pool.priority, template.priority)).or_default().push(GroupMember {
                    candidate,
                    pool: pool.clone(),
                    template: template.clone(),
                    zone: zone.clone(),
                });
            }
        }
    }
    by_priority
        .into_iter()
        .map(|(priority_key, members)| SimulationGroup { priority_key, members })
        .collect()
}

fn populate_base_view(base: &BaseView, snapshot: &ClusterSnapshot) -> Result<(), GeneratorError> {
    base.reset();
    for node in &snapshot.nodes {
        base.store_node(node.clone()).map_err(|e| GeneratorError::Populate(e.to_string()))?;
    }
    for pod in snapshot.pods.iter().chain(snapshot.unscheduled_pods.iter()) {
        base.store_pod(pod.clone()).map_err(|e| GeneratorError::Populate(e.to_string()))?;
    }
    Ok(())
}

fn pending_pod_keys(base: &BaseView) -> Result<Vec<String>, GeneratorError> {
    let (pods, _) = base.list_pods(None)?;
    Ok(pods.iter().filter(|p| p.is_pending_decision()).map(|p| p.key()).collect())
}

/// Materializes a winning candidate's synthetic node and its scaled-assignment pods
/// into the base view (spec.md §4.9: "winners are applied to the base view"). Pods
/// that landed on pre-existing nodes as a ripple effect (`other_assignments`) are
/// left untouched — the sandbox that produced them is ephemeral, and only the
/// candidate actually being advised on is a real commitment.
fn apply_winner(base: &BaseView, pool: &NodePool, template: &NodeTemplate, zone: &str, outcome: &SimulationOutcome) -> Result<(), GeneratorError> {
    let node = simulation::build_synthetic_node(pool, template, zone, &outcome.simulation_id, &outcome.node_name);
    base.store_node(node)?;
    for key in &outcome.scaled_assignment {
        let (namespace, name) = split_key(key);
        base.update_pod_node_binding(namespace, name, &outcome.node_name)?;
    }
    Ok(())
}

fn split_key(key: &str) -> (&str, &str) {
    match key.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => ("", key),
    }
}

struct PassResult {
    winners: Vec<(NodeScore, SimulationOutcome, Candidate)>,
    residual: Vec<String>,
}

async fn run_pass(
    pass_id: &str,
    base: Arc<dyn View>,
    base_concrete: &BaseView,
    counter: Arc<AtomicI64>,
    groups: &[SimulationGroup],
    deps: &GeneratorDeps,
    prices: &crate::core::objects::PriceTable,
    simulations_run: &mut u32,
) -> Result<PassResult, GeneratorError> {
    let mut winners = Vec::new();
    let mut residual = pending_pod_keys(base_concrete)?;

    for group in groups {
        if residual.is_empty() {
            break;
        }
        *simulations_run += group.members.len() as u32;
        let outcome = group
            .run(
                pass_id,
                base.clone(),
                counter.clone(),
                deps.watch_queue_size,
                deps.launcher.clone(),
                deps.stabilization,
                deps.scorer.as_ref(),
                deps.selector.as_ref(),
                prices,
                deps.registry.clone(),
            )
            .await
            .map_err(GeneratorError::SimulationGroup)?;

        let Some((score, sim_outcome)) = outcome.winner else {
            debug!("pass {pass_id}: group {:?} produced no winner", group.priority_key);
            continue;
        };

        let member = group
            .members
            .iter()
            .find(|m| m.candidate == sim_outcome.candidate)
            .expect("winning outcome must come from one of this group's members");

        apply_winner(base_concrete, &member.pool, &member.template, &member.zone, &sim_outcome)?;
        residual = score.unscheduled_pods.clone();
        winners.push((score, sim_outcome, member.candidate.clone()));
    }

    Ok(PassResult { winners, residual })
}

/// Runs the pass loop to completion (spec.md §4.9) and returns the full ordered
/// event sequence: zero or more `PartialAdvice` (only in [`GenerationMode::Incremental`])
/// followed by exactly one `TerminalAdvice`.
///
/// Returns `Err` when the request fails outright: no unscheduled pods to begin with,
/// a scorer/selector error, or convergence with zero accumulated winners. Callers at
/// the API boundary translate an `Err` into a terminal `Error` event themselves, since
/// the generator doesn't know the transport's framing.
pub async fn generate_advice(request: &ScalingAdviceRequest, deps: GeneratorDeps) -> Result<Vec<ScalingAdviceEvent>, GenScalingAdviceError> {
    generate_advice_mode(request, deps, GenerationMode::Incremental).await
}

pub async fn generate_advice_mode(
    request: &ScalingAdviceRequest,
    deps: GeneratorDeps,
    mode: GenerationMode,
) -> Result<Vec<ScalingAdviceEvent>, GenScalingAdviceError> {
    let wrap = |e: GeneratorError| GenScalingAdviceError::new(request.id.clone(), request.correlation_id.clone(), e);

    if request.snapshot.unscheduled_pods.is_empty() {
        return Err(wrap(GeneratorError::NoUnscheduledPods));
    }

    let started = Instant::now();
    let base_concrete = BaseView::new(deps.watch_queue_size);
    populate_base_view(&base_concrete, &request.snapshot).map_err(&wrap)?;
    let counter = base_concrete.counter();
    let base: Arc<dyn View> = Arc::new(base_concrete.clone());

    let groups = ordered_priority_groups(&request.constraint);
    let max_passes = request.snapshot.unscheduled_pods.len() as u32 + 1;

    let mut events = Vec::new();
    let mut consolidated: BTreeMap<(String, String, String), i64> = BTreeMap::new();
    let mut simulations_run = 0u32;
    let mut pass_count = 0u32;

    loop {
        if pass_count >= max_passes {
            warn!("request {}: pass loop exceeded bound of {max_passes}, stopping", request.id);
            break;
        }
        pass_count += 1;
        let pass_id = format!("{}-pass-{pass_count}", request.id);

        let result = run_pass(&pass_id, base.clone(), &base_concrete, counter.clone(), &groups, &deps, &request.constraint.prices, &mut simulations_run)
            .await
            .map_err(&wrap)?;

        if result.winners.is_empty() {
            break;
        }

        let mut scale_out_items = Vec::with_capacity(result.winners.len());
        for (_, _, candidate) in &result.winners {
            let key = (candidate.pool.clone(), candidate.template.clone(), candidate.zone.clone());
            *consolidated.entry(key).or_insert(0) += 1;
            scale_out_items.push(ScaleItem {
                pool: candidate.pool.clone(),
                template: candidate.template.clone(),
                zone: candidate.zone.clone(),
                delta: 1,
            });
        }

        info!(
            "request {}: pass {pass_count} produced {} winner(s), {} pod(s) still residual",
            request.id,
            scale_out_items.len(),
            result.residual.len()
        );

        if mode == GenerationMode::Incremental {
            events.push(ScalingAdviceEvent::PartialAdvice {
                id: request.id.clone(),
                scale_out_items,
                scale_in_items: Vec::new(),
                residual_unscheduled: result.residual.clone(),
            });
        }

        if result.residual.is_empty() {
            break;
        }
    }

    if consolidated.is_empty() {
        return Err(wrap(GeneratorError::NoScalingAdvice));
    }

    let consolidated_items = consolidated
        .into_iter()
        .map(|((pool, template, zone), delta)| ScaleItem { pool, template, zone, delta })
        .collect();

    events.push(ScalingAdviceEvent::TerminalAdvice {
        id: request.id.clone(),
        consolidated_items,
        diagnostics: Some(Diagnostics {
            passes: pass_count,
            simulations_run,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    });

    Ok(events)
}

/// Builds the terminal `Error` event a caller should surface on the wire when
/// [`generate_advice`] fails (spec.md §4.9 error surfacing).
impl From<&GenScalingAdviceError> for ScalingAdviceEvent {
    fn from(err: &GenScalingAdviceError) -> Self {
        ScalingAdviceEvent::Error {
            id: err.request_id.clone(),
            correlation_id: err.correlation_id.clone(),
            cause: err.source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use crate::core::common::Resources;
    use crate::core::node::Node;
    use crate::core::objects::{BackoffPolicy, PriceEntry, PriceTable, ScaleInPolicy};
    use crate::core::pod::Pod;
    use crate::scheduler::DefaultScheduler;
    use crate::simulation::scoring::{LeastWasteScorer, LeastWasteSelector, ScoreWeights};

    fn template(name: &str, cpu: u64, memory: u64, priority: i32) -> NodeTemplate {
        NodeTemplate {
            name: name.to_string(),
            instance_type: "m5.large".to_string(),
            capacity: Resources { cpu, memory, ephemeral_storage: 0 },
            kube_reserved: Resources::default(),
            system_reserved: Resources::default(),
            eviction_hard: Resources::default(),
            max_volumes: 8,
            priority,
        }
    }

    fn pool(name: &str, templates: Vec<NodeTemplate>, priority: i32) -> NodePool {
        NodePool {
            name: name.to_string(),
            region: "us-east".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            taints: vec![],
            zones: vec!["us-east-1a".to_string()],
            node_templates: templates,
            quota: None,
            scale_in_policy: Some(ScaleInPolicy::default()),
            backoff_policy: Some(BackoffPolicy::default()),
            priority,
        }
    }

    fn prices() -> PriceTable {
        PriceTable {
            entries: vec![PriceEntry {
                region: "us-east".to_string(),
                instance_type: "m5.large".to_string(),
                hourly_price: 0.2,
            }],
        }
    }

    fn deps() -> GeneratorDeps {
        let algorithm = Arc::new(DefaultScheduler::default());
        let launcher = Arc::new(SchedulerLauncher::new(4, algorithm, Duration::from_millis(5)));
        GeneratorDeps {
            launcher,
            scorer: Box::new(LeastWasteScorer { weights: ScoreWeights::default() }),
            selector: Box::new(LeastWasteSelector),
            stabilization: StabilizationConfig {
                window: Duration::from_millis(500),
                poll_interval: Duration::from_millis(10),
            },
            watch_queue_size: 16,
            registry: None,
        }
    }

    #[tokio::test]
    async fn single_pass_schedules_all_pods_onto_one_winner() {
        let request = ScalingAdviceRequest {
            id: "req-1".to_string(),
            correlation_id: "corr-1".to_string(),
            constraint: ScalingConstraint {
                node_pools: vec![pool("p1", vec![template("t1", 4000, 8192, 1)], 1)],
                prices: prices(),
            },
            snapshot: ClusterSnapshot {
                nodes: vec![],
                pods: vec![],
                unscheduled_pods: vec![Pod::new("a", "default", Resources { cpu: 500, memory: 512, ephemeral_storage: 0 })],
            },
        };

        let events = generate_advice(&request, deps()).await.unwrap();
        let terminal = events.last().unwrap();
        match terminal {
            ScalingAdviceEvent::TerminalAdvice { consolidated_items, .. } => {
                assert_eq!(consolidated_items.len(), 1);
                assert_eq!(consolidated_items[0].delta, 1);
            }
            other => panic!("expected TerminalAdvice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_unscheduled_pods_fails_fast() {
        let request = ScalingAdviceRequest {
            id: "req-2".to_string(),
            correlation_id: "corr-2".to_string(),
            constraint: ScalingConstraint {
                node_pools: vec![pool("p1", vec![template("t1", 4000, 8192, 1)], 1)],
                prices: prices(),
            },
            snapshot: ClusterSnapshot::default(),
        };
        let err = generate_advice(&request, deps()).await.unwrap_err();
        assert!(matches!(err.source, GeneratorError::NoUnscheduledPods));
    }

    #[tokio::test]
    async fn pods_too_large_for_any_candidate_yields_no_scaling_advice() {
        let request = ScalingAdviceRequest {
            id: "req-3".to_string(),
            correlation_id: "corr-3".to_string(),
            constraint: ScalingConstraint {
                node_pools: vec![pool("p1", vec![template("t1", 100, 100, 1)], 1)],
                prices: prices(),
            },
            snapshot: ClusterSnapshot {
                nodes: vec![],
                pods: vec![],
                unscheduled_pods: vec![Pod::new("huge", "default", Resources { cpu: 100_000, memory: 100_000, ephemeral_storage: 0 })],
            },
        };
        let err = generate_advice(&request, deps()).await.unwrap_err();
        assert!(matches!(err.source, GeneratorError::NoScalingAdvice));
    }

    #[tokio::test]
    async fn all_at_once_mode_emits_only_terminal_event() {
        let request = ScalingAdviceRequest {
            id: "req-4".to_string(),
            correlation_id: "corr-4".to_string(),
            constraint: ScalingConstraint {
                node_pools: vec![pool("p1", vec![template("t1", 1000, 2048, 1)], 1)],
                prices: prices(),
            },
            snapshot: ClusterSnapshot {
                nodes: vec![],
                pods: vec![],
                unscheduled_pods: vec![
                    Pod::new("a", "default", Resources { cpu: 400, memory: 512, ephemeral_storage: 0 }),
                    Pod::new("b", "default", Resources { cpu: 400, memory: 512, ephemeral_storage: 0 }),
                ],
            },
        };
        let events = generate_advice_mode(&request, deps(), GenerationMode::AllAtOnce).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ScalingAdviceEvent::TerminalAdvice { .. }));
    }

    #[test]
    fn ordered_priority_groups_sorts_ascending_and_expands_zones() {
        let constraint = ScalingConstraint {
            node_pools: vec![
                pool("high", vec![template("t", 1, 1, 2)], 2),
                pool("low", vec![template("t", 1, 1, 1)], 1),
            ],
            prices: PriceTable::default(),
        };
        let groups = ordered_priority_groups(&constraint);
        assert_eq!(groups[0].priority_key, (1, 1));
        assert_eq!(groups[1].priority_key, (2, 2));
    }
}
