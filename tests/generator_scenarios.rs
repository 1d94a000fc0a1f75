//! End-to-end scenarios for the advice generator pass loop, run through the public
//! crate API the way an operator's integration test would.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use scaling_advisor::core::common::Resources;
use scaling_advisor::core::objects::{
    BackoffPolicy, ClusterSnapshot, NodePool, NodeTemplate, PriceEntry, PriceTable, ScaleInPolicy, ScalingAdviceEvent, ScalingAdviceRequest,
    ScalingConstraint,
};
use scaling_advisor::core::pod::Pod;
use scaling_advisor::generator::{generate_advice, GeneratorDeps};
use scaling_advisor::scheduler::{DefaultScheduler, SchedulerLauncher};
use scaling_advisor::simulation::scoring::{LeastWasteScorer, LeastWasteSelector, ScoreWeights};
use scaling_advisor::simulation::simulation::StabilizationConfig;

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

fn pool(name: &str, region: &str, templates: Vec<NodeTemplate>, priority: i32) -> NodePool {
    NodePool {
        name: name.to_string(),
        region: region.to_string(),
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        taints: vec![],
        zones: vec!["z".to_string()],
        node_templates: templates,
        quota: None,
        scale_in_policy: Some(ScaleInPolicy::default()),
        backoff_policy: Some(BackoffPolicy::default()),
        priority,
    }
}

fn deps() -> GeneratorDeps {
    let algorithm = Arc::new(DefaultScheduler::default());
    let launcher = Arc::new(SchedulerLauncher::new(4, algorithm, Duration::from_millis(5)));
    GeneratorDeps {
        launcher,
        scorer: Box::new(LeastWasteScorer { weights: ScoreWeights::default() }),
        selector: Box::new(LeastWasteSelector),
        stabilization: StabilizationConfig { window: Duration::from_millis(500), poll_interval: Duration::from_millis(10) },
        watch_queue_size: 16,
        registry: None,
    }
}

fn small_pod(name: &str) -> Pod {
    Pod::new(name, "default", Resources { cpu: 500, memory: 512, ephemeral_storage: 0 })
}

/// S1 — single pod, single candidate: one pool, one template, one zone; the
/// unscheduled pod fits. Expected a single consolidated item with delta 1 and an
/// empty residual.
#[tokio::test]
async fn s1_single_pod_single_candidate() {
    let request = ScalingAdviceRequest {
        id: "s1".to_string(),
        correlation_id: "s1-corr".to_string(),
        constraint: ScalingConstraint {
            node_pools: vec![pool("p", "us-east", vec![template("t", 2000, 4096, 1)], 1)],
            prices: PriceTable { entries: vec![PriceEntry { region: "us-east".to_string(), instance_type: "m5.large".to_string(), hourly_price: 0.2 }] },
        },
        snapshot: ClusterSnapshot { nodes: vec![], pods: vec![], unscheduled_pods: vec![small_pod("a")] },
    };

    let events = generate_advice(&request, deps()).await.unwrap();
    match events.last().unwrap() {
        ScalingAdviceEvent::TerminalAdvice { consolidated_items, .. } => {
            assert_eq!(consolidated_items.len(), 1);
            assert_eq!(consolidated_items[0].pool, "p");
            assert_eq!(consolidated_items[0].template, "t");
            assert_eq!(consolidated_items[0].delta, 1);
        }
        other => panic!("expected TerminalAdvice, got {other:?}"),
    }
}

/// S2 — two candidates with identical templates but different priorities and
/// prices; priority must beat cost even when the cheaper pool would score better.
#[tokio::test]
async fn s2_priority_beats_cost() {
    let request = ScalingAdviceRequest {
        id: "s2".to_string(),
        correlation_id: "s2-corr".to_string(),
        constraint: ScalingConstraint {
            node_pools: vec![
                pool("p1", "us-east", vec![template("t", 2000, 4096, 1)], 1),
                pool("p2", "us-east", vec![template("t", 2000, 4096, 1)], 2),
            ],
            prices: PriceTable {
                entries: vec![
                    PriceEntry { region: "us-east".to_string(), instance_type: "m5.large".to_string(), hourly_price: 0.10 },
                ],
            },
        },
        snapshot: ClusterSnapshot { nodes: vec![], pods: vec![], unscheduled_pods: vec![small_pod("a")] },
    };

    let events = generate_advice(&request, deps()).await.unwrap();
    match events.last().unwrap() {
        ScalingAdviceEvent::TerminalAdvice { consolidated_items, .. } => {
            assert_eq!(consolidated_items.len(), 1);
            assert_eq!(consolidated_items[0].pool, "p1", "lower-priority-number pool must win regardless of price");
        }
        other => panic!("expected TerminalAdvice, got {other:?}"),
    }
}

/// S3 — multi-pass convergence: three pods that each need a full node's worth of
/// cpu converge over three passes, each emitting a `PartialAdvice` with delta 1.
#[tokio::test]
async fn s3_multi_pass_convergence() {
    let request = ScalingAdviceRequest {
        id: "s3".to_string(),
        correlation_id: "s3-corr".to_string(),
        constraint: ScalingConstraint {
            node_pools: vec![pool("p", "us-east", vec![template("t", 2000, 4096, 1)], 1)],
            prices: PriceTable { entries: vec![PriceEntry { region: "us-east".to_string(), instance_type: "m5.large".to_string(), hourly_price: 0.2 }] },
        },
        snapshot: ClusterSnapshot {
            nodes: vec![],
            pods: vec![],
            unscheduled_pods: vec![
                Pod::new("a", "default", Resources { cpu: 1800, memory: 512, ephemeral_storage: 0 }),
                Pod::new("b", "default", Resources { cpu: 1800, memory: 512, ephemeral_storage: 0 }),
                Pod::new("c", "default", Resources { cpu: 1800, memory: 512, ephemeral_storage: 0 }),
            ],
        },
    };

    let events = generate_advice(&request, deps()).await.unwrap();
    let partials: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ScalingAdviceEvent::PartialAdvice { .. }))
        .collect();
    assert_eq!(partials.len(), 3, "expected one PartialAdvice per pass, got {}", partials.len());
    for partial in &partials {
        if let ScalingAdviceEvent::PartialAdvice { scale_out_items, .. } = partial {
            assert_eq!(scale_out_items.len(), 1);
            assert_eq!(scale_out_items[0].delta, 1);
        }
    }

    match events.last().unwrap() {
        ScalingAdviceEvent::TerminalAdvice { consolidated_items, .. } => {
            assert_eq!(consolidated_items.len(), 1);
            assert_eq!(consolidated_items[0].delta, 3);
        }
        other => panic!("expected TerminalAdvice, got {other:?}"),
    }
}

/// S4 — no progress: every candidate is tainted against every pod, so no
/// simulation ever produces a winner and the generator reports `no-scaling-advice`.
#[tokio::test]
async fn s4_no_progress_yields_error_event() {
    use scaling_advisor::core::node::{Taint, TaintEffect};

    let mut tainted_pool = pool("p", "us-east", vec![template("t", 4000, 8192, 1)], 1);
    tainted_pool.taints = vec![Taint { key: "dedicated".to_string(), value: "gpu".to_string(), effect: TaintEffect::NoSchedule }];

    let request = ScalingAdviceRequest {
        id: "s4".to_string(),
        correlation_id: "s4-corr".to_string(),
        constraint: ScalingConstraint {
            node_pools: vec![tainted_pool],
            prices: PriceTable { entries: vec![PriceEntry { region: "us-east".to_string(), instance_type: "m5.large".to_string(), hourly_price: 0.2 }] },
        },
        snapshot: ClusterSnapshot { nodes: vec![], pods: vec![], unscheduled_pods: vec![small_pod("a")] },
    };

    let err = generate_advice(&request, deps()).await.unwrap_err();
    assert!(matches!(err.source, scaling_advisor::errors::GeneratorError::NoScalingAdvice));
}
